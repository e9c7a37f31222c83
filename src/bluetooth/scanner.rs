/// Bluetooth Low Energy advertisement intake
use bluer::{Address, AdapterEvent, DeviceEvent, DeviceProperty};
use futures_util::stream::SelectAll;
use futures_util::{Stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::pin::Pin;

use crate::pipeline::Producer;

type DeviceEventStream = Pin<Box<dyn Stream<Item = (Address, DeviceEvent)> + Send>>;

/// Run a continuous LE scan and feed every manufacturer-data advertisement
/// into the pipeline's producer. Runs until the future is dropped (the
/// caller races it against the shutdown signal).
pub async fn scan_advertisements(producer: Producer) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    // Low Energy only; duplicates are wanted, every advertisement counts.
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: true,
        ..Default::default()
    };
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    let discover = match adapter.discover_devices().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to start device discovery: {}", e);
            return Err(e.into());
        }
    };
    tokio::pin!(discover);

    info!("Scanning for StructureNode advertisements");

    // One merged stream of property-change events across all known devices.
    let mut device_events: SelectAll<DeviceEventStream> = SelectAll::new();
    let mut last_rssi: HashMap<Address, i16> = HashMap::new();

    loop {
        tokio::select! {
            Some(event) = discover.next() => match event {
                AdapterEvent::DeviceAdded(addr) => {
                    let device = match adapter.device(addr) {
                        Ok(device) => device,
                        Err(_) => continue,
                    };

                    if let Ok(Some(rssi)) = device.rssi().await {
                        last_rssi.insert(addr, rssi);
                    }

                    // Snapshot the advertisement that made the device
                    // appear; later updates arrive as property changes.
                    if let Ok(Some(manufacturer_data)) = device.manufacturer_data().await {
                        let rssi = last_rssi.get(&addr).copied().unwrap_or(0);
                        producer.handle_advertisement(&addr.to_string(), rssi, &manufacturer_data);
                    }

                    match device.events().await {
                        Ok(events) => {
                            device_events.push(Box::pin(events.map(move |ev| (addr, ev))));
                        }
                        Err(e) => debug!("Failed to subscribe to {}: {}", addr, e),
                    }
                }
                AdapterEvent::DeviceRemoved(addr) => {
                    last_rssi.remove(&addr);
                }
                _ => {}
            },
            Some((addr, event)) = device_events.next(), if !device_events.is_empty() => {
                if let DeviceEvent::PropertyChanged(property) = event {
                    match property {
                        DeviceProperty::Rssi(rssi) => {
                            last_rssi.insert(addr, rssi);
                        }
                        DeviceProperty::ManufacturerData(manufacturer_data) => {
                            let rssi = last_rssi.get(&addr).copied().unwrap_or(0);
                            producer.handle_advertisement(
                                &addr.to_string(),
                                rssi,
                                &manufacturer_data,
                            );
                        }
                        _ => {}
                    }
                }
            },
            else => break,
        }
    }

    Ok(())
}
