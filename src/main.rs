//! heartring firmware entry point (nRF52840 + SoftDevice S140).
//!
//! Boot order matters: the ring comes up dark first, then the radio,
//! then the first scan.  After that a single loop owns the coordinator
//! and serializes radio events with the pulse timers.

#![no_std]
#![no_main]

mod radio;
mod ring;

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, spim};
use embassy_time::{Duration, Instant, Timer};
use heartring::clock::Clock;
use heartring::config::IDLE_POLL_MS;
use heartring::status::{StatusLine, StatusSink};
use heartring::Coordinator;
use nrf_softdevice::{raw, Softdevice};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Status lines go out over RTT next to the logs.
struct RttStatus;

impl StatusSink for RttStatus {
    fn emit(&mut self, line: StatusLine) {
        info!("{}", defmt::Display2Format(&line));
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_cfg_t {
            adv_set_count: raw::BLE_GAP_ADV_SET_COUNT_DEFAULT as u8,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_cfg_t::new_bitfield_1(0),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("heartring starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    // 1. LED ring (WS2812 data on P0.12; SCK on P0.13 is not wired)
    interrupt::SPIM3.set_priority(Priority::P2);
    let mut spi_config = spim::Config::default();
    spi_config.frequency = spim::Frequency::M4;
    spi_config.mode = spim::MODE_0;
    let spi = spim::Spim::new_txonly(p.SPI3, Irqs, p.P0_13, p.P0_12, spi_config);
    let ring = ring::SpiRing::new(spi);

    // 2. Radio
    let sd = Softdevice::enable(&softdevice_config());
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(radio::scan_task(sd)));

    let mut coordinator = Coordinator::new(
        radio::RadioLink::new(sd, spawner),
        radio::RadioScanner,
        ring,
        RttStatus,
        SystemClock,
    );

    // 3. First scan
    coordinator.start();

    loop {
        if let Err(e) = coordinator.drive().await {
            warn!("link attempt failed: {}", e);
        }

        let wake = coordinator
            .poll()
            .unwrap_or_else(|| Instant::now() + Duration::from_millis(IDLE_POLL_MS));

        match select(radio::EVENTS.receive(), Timer::at(wake)).await {
            Either::First(event) => {
                if let Err(e) = coordinator.handle(event).await {
                    warn!("event dropped: {}", e);
                }
            }
            Either::Second(()) => {}
        }
    }
}
