/// Advertisement ingestion pipeline: decode, dedupe, batch, flush
use async_trait::async_trait;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::battery;
use crate::config::ServiceConfig;
use crate::models::{DecodedReading, ReadingRecord};
use crate::payload::{decode_payload, COMPANY_ID};

/// Bulk destination for validated readings. One call per batch; the whole
/// batch is written or none of it.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn insert_batch(&self, rows: Vec<ReadingRecord>) -> Result<(), String>;
}

/// Producer half of the pipeline, invoked from the scanner's event path.
/// Cheap to clone; never blocks.
#[derive(Clone)]
pub struct Producer {
    tx: mpsc::Sender<ReadingRecord>,
}

impl Producer {
    /// Handle one advertisement event. Events without our company id entry
    /// or without a source identity are ignored; undecodable payloads are
    /// dropped. A full queue drops the newest record rather than blocking.
    pub fn handle_advertisement(
        &self,
        source: &str,
        rssi: i16,
        manufacturer_data: &HashMap<u16, Vec<u8>>,
    ) {
        let raw = match manufacturer_data.get(&COMPANY_ID) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return,
        };
        if source.is_empty() {
            return;
        }

        // Try the bytes as-is first (covers unprefixed V4), then with a
        // synthetic company id prefix (the BLE stack strips it from V2/V3A).
        let decoded = decode_payload(raw).or_else(|| {
            let mut prefixed = Vec::with_capacity(raw.len() + 2);
            prefixed.extend_from_slice(&COMPANY_ID.to_le_bytes());
            prefixed.extend_from_slice(raw);
            decode_payload(&prefixed)
        });

        let decoded = match decoded {
            Some(decoded) => decoded,
            None => {
                debug!(
                    "drop undecoded source={} rssi={} mfg_len={} first8={}",
                    source,
                    rssi,
                    raw.len(),
                    hex_prefix(raw, 8)
                );
                return;
            }
        };

        let record = ReadingRecord::from_decoded(source, rssi, &decoded);
        // Battery percent straight from the payload when present, estimated
        // from the discharge curve otherwise.
        let batt_pct = record
            .batt_pct
            .or_else(|| battery::mv_to_percent(Some(record.batt_mv as u16)).map(i32::from));
        let loc = match &decoded {
            DecodedReading::V4(d) => format!(" loc={}({})", d.location.label(), d.location as u8),
            _ => String::new(),
        };
        debug!(
            "accepted source={} rssi={} proto={} seq={} t={:.2}C rh={:.2}% p={:.1}hPa batt={}mV (~{}%){}",
            source,
            record.rssi,
            decoded.protocol(),
            record.seq,
            record.temp_c,
            record.hum_pct,
            record.press_hpa,
            record.batt_mv,
            batt_pct.unwrap_or(0),
            loc,
        );

        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("queue full; dropping newest reading");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// A running ingestion pipeline: a bounded queue feeding a single consumer
/// task that dedupes, batches and flushes to the sink.
pub struct Pipeline {
    tx: mpsc::Sender<ReadingRecord>,
    consumer: JoinHandle<()>,
}

impl Pipeline {
    pub fn start(config: &ServiceConfig, sink: Arc<dyn ReadingSink>) -> Pipeline {
        let (tx, rx) = mpsc::channel(config.queue_max);
        let consumer = Consumer {
            rx,
            sink,
            batch: Vec::new(),
            last_seq_seen: HashMap::new(),
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            max_seq_cache: config.max_seq_cache,
            last_flush: Instant::now(),
            inflight: None,
        };
        Pipeline {
            tx,
            consumer: tokio::spawn(consumer.run()),
        }
    }

    pub fn producer(&self) -> Producer {
        Producer {
            tx: self.tx.clone(),
        }
    }

    /// Stop accepting records, let the consumer drain the queue and run its
    /// final forced flush, and return once that flush has completed.
    pub async fn shutdown(self) {
        let Pipeline { tx, consumer } = self;
        drop(tx);
        if let Err(e) = consumer.await {
            error!("consumer task failed: {}", e);
        }
    }
}

struct Consumer {
    rx: mpsc::Receiver<ReadingRecord>,
    sink: Arc<dyn ReadingSink>,
    batch: Vec<ReadingRecord>,
    last_seq_seen: HashMap<String, i32>,
    batch_size: usize,
    flush_interval: Duration,
    max_seq_cache: usize,
    last_flush: Instant,
    inflight: Option<JoinHandle<()>>,
}

impl Consumer {
    async fn run(mut self) {
        loop {
            match timeout(self.flush_interval, self.rx.recv()).await {
                Ok(Some(record)) => {
                    self.accept(record);
                    self.flush_if_ready(false).await;
                }
                // All producers dropped: drain is complete, force the final
                // flush and stop.
                Ok(None) => {
                    self.flush_if_ready(true).await;
                    break;
                }
                Err(_) => {
                    self.flush_if_ready(false).await;
                }
            }
        }
        if let Some(inflight) = self.inflight.take() {
            let _ = inflight.await;
        }
    }

    /// Append a record to the batch unless it repeats the source's last
    /// seen sequence number.
    fn accept(&mut self, record: ReadingRecord) {
        if let Some(prev) = self.last_seq_seen.get(&record.source) {
            if *prev == record.seq {
                debug!("dup drop source={} seq={}", record.source, record.seq);
                return;
            }
        }
        // Keep the cache bounded; the evicted entry is arbitrary.
        if self.last_seq_seen.len() > self.max_seq_cache {
            if let Some(victim) = self.last_seq_seen.keys().next().cloned() {
                self.last_seq_seen.remove(&victim);
            }
        }
        self.last_seq_seen.insert(record.source.clone(), record.seq);
        self.batch.push(record);
    }

    async fn flush_if_ready(&mut self, force: bool) {
        let now = Instant::now();

        // An empty batch never triggers a write; still reset the timer.
        if self.batch.is_empty() {
            self.last_flush = now;
            return;
        }

        if !force
            && self.batch.len() < self.batch_size
            && now.duration_since(self.last_flush) < self.flush_interval
        {
            return;
        }

        let rows = std::mem::take(&mut self.batch);
        self.last_flush = now;

        // At most one write in flight: wait for the previous write to
        // report before dispatching the next, but run the write itself off
        // the wait loop so a slow sink does not stall intake.
        if let Some(inflight) = self.inflight.take() {
            let _ = inflight.await;
        }
        let sink = Arc::clone(&self.sink);
        self.inflight = Some(tokio::spawn(async move {
            let count = rows.len();
            match sink.insert_batch(rows).await {
                Ok(()) => debug!("bulk insert wrote {} rows", count),
                Err(e) => error!("bulk insert failed, dropping {} rows: {}", count, e),
            }
        }));
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| format!("{:02x}", b))
        .collect()
}
