#![no_std]
#![no_main]
#![deny(unused_must_use)]

use embassy_executor::Spawner;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex, signal::Signal};
use embassy_time::Timer;
use esp_backtrace as _;
use esp_hal::{
    clock::CpuClock,
    i2c::master::I2c,
    time::Rate,
    timer::systimer::SystemTimer,
    Async,
};
use gy80_ahrs::{
    clock::SystemClock, math::quat_to_euler, Ahrs, Attitude, Baro, Config, Registered, EV_AHRS,
};
use log::{debug, error, info};

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

type I2cBus = Mutex<CriticalSectionRawMutex, I2c<'static, Async>>;

static STOP_AHRS: Signal<CriticalSectionRawMutex, ()> = Signal::new();
static STOP_BARO: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Defaults overridden by build time environment, e.g. `AHRS_RATE=50 cargo build`
fn config() -> Config {
    let overrides = [
        ("ahrs.rate", option_env!("AHRS_RATE")),
        ("ahrs.beta", option_env!("AHRS_BETA")),
        ("ahrs.accel_range", option_env!("AHRS_ACCEL_RANGE")),
        ("ahrs.mag_range", option_env!("AHRS_MAG_RANGE")),
        ("ahrs.gyro_range", option_env!("AHRS_GYRO_RANGE")),
        ("baro.rate", option_env!("BARO_RATE")),
    ];

    let mut config = Config::default();
    for (key, value) in overrides {
        if let Some(value) = value {
            if let Err(err) = config.set(key, value) {
                panic!("{key} = {value} is invalid: {err:?}");
            }
        }
    }
    config
}

fn log_attitude(attitude: &Attitude) {
    let rotation = quat_to_euler(&(*attitude).into());
    debug!(
        "yaw: {}deg, pitch: {}deg, roll: {}deg",
        rotation.yaw.to_degrees(),
        rotation.pitch.to_degrees(),
        rotation.roll.to_degrees()
    );
}

#[embassy_executor::task]
async fn ahrs_task(ahrs: Ahrs<'static, &'static I2cBus, SystemClock>) {
    let mut ahrs = Registered::new(ahrs);
    if ahrs.init().await.is_err() {
        return;
    }

    if let Err(err) = ahrs.node_mut().run(&STOP_AHRS).await {
        error!("AHRS stopped: {err:?}");
    }
    ahrs.term().await;
}

#[embassy_executor::task]
async fn baro_task(baro: Baro<&'static I2cBus>) {
    let mut baro = Registered::new(baro);
    if baro.init().await.is_err() {
        return;
    }

    if let Err(err) = baro.node_mut().run(&STOP_BARO).await {
        error!("Barometer stopped: {err:?}");
    }
    baro.term().await;
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));

    let systimer = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(systimer.alarm0);

    let config = config();
    info!("Starting with {config:?}");

    let i2c = I2c::new(
        peripherals.I2C0,
        esp_hal::i2c::master::Config::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to configure I2C")
    .into_async()
    .with_scl(peripherals.GPIO21)
    .with_sda(peripherals.GPIO20);

    let i2c_bus: &'static I2cBus = mk_static!(I2cBus, Mutex::new(i2c));

    EV_AHRS
        .subscribe(log_attitude)
        .expect("Failed to subscribe attitude logger");

    spawner.must_spawn(ahrs_task(Ahrs::new(i2c_bus, SystemClock, config, &EV_AHRS)));
    spawner.must_spawn(baro_task(Baro::new(i2c_bus, config)));

    loop {
        Timer::after_secs(10_000).await;
    }
}
