/// Battery voltage to charge percentage mapping
///
/// Same piecewise-linear curve the StructureNode firmware uses for its
/// single-cell battery (M5Battery curve): 13 anchors from 4.20 V / 100 %
/// down to 3.20 V / 0 %, descending in both dimensions.
const CURVE: [(f32, i32); 13] = [
    (4.20, 100),
    (4.10, 90),
    (4.00, 80),
    (3.92, 70),
    (3.85, 60),
    (3.79, 50),
    (3.74, 40),
    (3.70, 30),
    (3.65, 20),
    (3.55, 10),
    (3.40, 5),
    (3.30, 2),
    (3.20, 0),
];

/// Map a cell voltage to an estimated charge percentage.
///
/// The input is clamped to the curve's range, linearly interpolated within
/// the bracketing anchor pair and rounded to the nearest integer (ties
/// round up).
pub fn voltage_to_percent(v: f32) -> u8 {
    let v = v.clamp(3.20, 4.20);

    for i in 0..CURVE.len() - 1 {
        let (av, ap) = CURVE[i];
        let (bv, bp) = CURVE[i + 1];
        if v <= av && v >= bv {
            let t = (av - v) / (av - bv);
            let pf = ap as f32 + (bp as f32 - ap as f32) * t;
            return (pf + 0.5).floor().clamp(0.0, 100.0) as u8;
        }
    }

    if v >= 4.20 {
        100
    } else {
        0
    }
}

/// Millivolt variant of the curve; absent input yields an absent result.
pub fn mv_to_percent(mv: Option<u16>) -> Option<u8> {
    mv.map(|mv| voltage_to_percent(mv as f32 / 1000.0))
}
