//! SoftDevice-backed scanner and GATT transport.
//!
//! - **Scan task** - runs `central::scan` windows on request and posts
//!   every advertiser listing the Heart Rate service to [`EVENTS`].
//! - **RadioLink** - `central::connect` to the accepted address, GATT
//!   discovery of 0x180D / 0x2A37, CCCD subscribe.
//! - **Notification task** - spawned per subscription; forwards each
//!   Heart Rate Measurement to [`EVENTS`] and posts `LinkLost` when the
//!   connection closes.

use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use heartring::ble::{adv_parser, DeviceAddress, Discovery, Scanner, Transport};
use heartring::config::{
    BLE_CONNECT_TIMEOUT, BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SCAN_INTERVAL,
    BLE_SCAN_WINDOW, BLE_SLAVE_LATENCY, BLE_SUP_TIMEOUT, HEART_RATE_MEASUREMENT_UUID,
    HEART_RATE_SERVICE_UUID,
};
use heartring::{Event, LinkError, Payload};
use nrf_softdevice::ble::{central, gatt_client, Address, AddressType, Connection};
use nrf_softdevice::{raw, Softdevice};

/// Radio → coordinator event queue.
pub static EVENTS: Channel<CriticalSectionRawMutex, Event, 8> = Channel::new();

#[derive(Clone, Copy)]
enum ScanCommand {
    Start(Duration),
    Stop,
}

static SCAN_CMD: Signal<CriticalSectionRawMutex, ScanCommand> = Signal::new();
static SCANNING: AtomicBool = AtomicBool::new(false);

/// nrf-softdevice GATT client for the Heart Rate service.
#[nrf_softdevice::gatt_client(uuid = "180d")]
pub struct HeartRateServiceClient {
    /// Heart Rate Measurement - notify only.
    #[characteristic(uuid = "2a37", notify)]
    pub heart_rate_measurement: Payload,
}

fn from_softdevice(address: &Address) -> DeviceAddress {
    let kind = match address.address_type() {
        AddressType::Public => 0u8,
        AddressType::RandomStatic => 1u8,
        AddressType::RandomPrivateResolvable => 2u8,
        AddressType::RandomPrivateNonResolvable => 3u8,
        AddressType::Anonymous => 4u8,
    };
    DeviceAddress::new(kind, address.bytes())
}

fn to_softdevice(address: &DeviceAddress) -> Option<Address> {
    let kind = match address.kind {
        0 => AddressType::Public,
        1 => AddressType::RandomStatic,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        4 => AddressType::Anonymous,
        _ => return None,
    };
    Some(Address::new(kind, address.bytes))
}

// Scanning

pub struct RadioScanner;

impl Scanner for RadioScanner {
    fn start_scan(&mut self, duration: Duration) {
        SCAN_CMD.signal(ScanCommand::Start(duration));
    }

    fn stop_scan(&mut self) {
        SCAN_CMD.signal(ScanCommand::Stop);
    }
}

#[embassy_executor::task]
pub async fn scan_task(sd: &'static Softdevice) -> ! {
    let mut pending: Option<ScanCommand> = None;

    loop {
        let cmd = match pending.take() {
            Some(cmd) => cmd,
            None => SCAN_CMD.wait().await,
        };
        let ScanCommand::Start(window) = cmd else {
            continue;
        };

        info!("BLE scan starting ({} ms window)", window.as_millis());

        let config = central::ScanConfig {
            // Active scan to retrieve scan-response data (device names).
            active: true,
            interval: BLE_SCAN_INTERVAL,
            window: BLE_SCAN_WINDOW,
            ..Default::default()
        };

        SCANNING.store(true, Ordering::Release);
        let scan = central::scan(sd, &config, |params| {
            let data = unsafe {
                core::slice::from_raw_parts(params.data.p_data, params.data.len as usize)
            };

            if adv_parser::contains_service_uuid(data, HEART_RATE_SERVICE_UUID) {
                let address = Address::from_raw(params.peer_addr);
                let discovery = Discovery {
                    address: from_softdevice(&address),
                    name: adv_parser::extract_device_name(data),
                    rssi: params.rssi,
                    services: adv_parser::service_uuids(data),
                };
                info!("Found: {} (RSSI {})", discovery.name.as_str(), discovery.rssi);
                if EVENTS.try_send(Event::Discovered(discovery)).is_err() {
                    warn!("event queue full - dropping discovery");
                }
            }

            // Keep scanning until told to stop or the window closes.
            None::<()>
        });

        match select3(scan, SCAN_CMD.wait(), Timer::after(window)).await {
            Either3::First(Err(_)) => warn!("BLE scan ended with error"),
            Either3::First(Ok(())) => {}
            Either3::Second(next) => pending = Some(next),
            Either3::Third(()) => info!("BLE scan window closed"),
        }
        SCANNING.store(false, Ordering::Release);
    }
}

// Connection

pub struct RadioLink {
    sd: &'static Softdevice,
    spawner: Spawner,
    conn: Option<Connection>,
}

impl RadioLink {
    pub fn new(sd: &'static Softdevice, spawner: Spawner) -> Self {
        Self {
            sd,
            spawner,
            conn: None,
        }
    }
}

impl Transport for RadioLink {
    /// `None` inside means the service exists but is missing the
    /// measurement characteristic.
    type Service = Option<HeartRateServiceClient>;
    type Characteristic = HeartRateServiceClient;

    async fn connect(&mut self, address: &DeviceAddress) -> Result<(), LinkError> {
        // The SoftDevice runs one scanner; connecting needs it free.
        for _ in 0..50 {
            if !SCANNING.load(Ordering::Acquire) {
                break;
            }
            Timer::after(Duration::from_millis(10)).await;
        }

        let peer = to_softdevice(address).ok_or(LinkError::ConnectFailed)?;
        let whitelist = [&peer];
        let conn_cfg = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                timeout: BLE_CONNECT_TIMEOUT,
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: BLE_CONN_INTERVAL_MIN,
                max_conn_interval: BLE_CONN_INTERVAL_MAX,
                slave_latency: BLE_SLAVE_LATENCY,
                conn_sup_timeout: BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let conn = central::connect(self.sd, &conn_cfg)
            .await
            .map_err(|_| LinkError::ConnectFailed)?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn service(&mut self, uuid: u16) -> Option<Self::Service> {
        if uuid != HEART_RATE_SERVICE_UUID {
            return None;
        }
        let conn = self.conn.as_ref()?;

        info!("Discovering HR service...");
        match gatt_client::discover::<HeartRateServiceClient>(conn).await {
            Ok(client) => Some(Some(client)),
            Err(gatt_client::DiscoverError::ServiceIncomplete) => Some(None),
            Err(_) => None,
        }
    }

    async fn characteristic(
        &mut self,
        service: Self::Service,
        uuid: u16,
    ) -> Option<Self::Characteristic> {
        if uuid != HEART_RATE_MEASUREMENT_UUID {
            return None;
        }
        service
    }

    async fn subscribe(&mut self, client: HeartRateServiceClient) -> Result<(), LinkError> {
        client
            .heart_rate_measurement_cccd_write(true)
            .await
            .map_err(|_| LinkError::SubscribeFailed)?;

        let conn = self.conn.clone().ok_or(LinkError::SubscribeFailed)?;
        self.spawner.spawn(notify_task(conn, client)).map_err(|_| {
            warn!("previous notification loop still running");
            LinkError::SubscribeFailed
        })
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.disconnect();
        }
    }
}

/// Forward notifications until the connection drops.
#[embassy_executor::task]
async fn notify_task(conn: Connection, client: HeartRateServiceClient) {
    info!("HR notification loop started");

    let _ = gatt_client::run(&conn, &client, |event| match event {
        HeartRateServiceClientEvent::HeartRateMeasurementNotification(value) => {
            // try_send avoids stalling the SoftDevice event path; a drop is logged.
            if EVENTS.try_send(Event::Notification(value)).is_err() {
                warn!("event queue full - dropping HR notification");
            }
        }
    })
    .await;

    info!("HR notification loop ended (connection closed)");
    EVENTS.send(Event::LinkLost).await;
}
