#![no_std]
#![no_main]

#[cfg(feature = "wifi")]
mod wifi;

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, Level, Output, Pull};
use esp_hal::i2c::master::{Config as i2cConfig, I2c};
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::peripherals::Peripherals;
use fugit::HertzU32;
use log::{error, info};
#[cfg(feature = "wifi")]
use esp_alloc as _;

use parking_gate_rs::control::{DisplayFrame, PwmActuators, StatusDisplay};
use parking_gate_rs::gate::{LOWERED_ANGLE, RAISED_ANGLE};
use parking_gate_rs::ranging::Vl53l0x;
use parking_gate_rs::ultrasonic::Hcsr04;
use parking_gate_rs::{ControlLoop, Instant, Now, ParkingConfig, SharedStatus};

/// Yield between loop passes so the network tasks get to run.
const LOOP_YIELD_MS: u64 = 5;
const SERVO_TEST_STEP_MS: u64 = 1000;
const SERVO_HZ: u32 = 50;
const MANEUVER_TONE_HZ: u32 = 2_000;
const LOCATE_TONE_HZ: u32 = 4_000;

static SHARED: SharedStatus = SharedStatus::new();

/// Embassy time driver as the crate clock.
#[derive(Clone, Copy)]
struct EmbassyClock;

impl Now for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(embassy_time::Instant::now().as_micros())
    }
}

/// Prints the status screen to the console on every display refresh.
struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&mut self, frame: &DisplayFrame) {
        info!("{} | {}", frame[0], frame[1]);
    }
}

/// Sensor bring-up failed. Blink the red LED forever instead of running blind.
async fn halt(mut red: Output<'static>) -> ! {
    loop {
        red.toggle();
        Timer::after(Duration::from_millis(250)).await;
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals: Peripherals = esp_hal::init(config);

    esp_println::logger::init_logger_from_env();

    let timer_group1 = esp_hal::timer::timg::TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timer_group1.timer0);

    info!("Embassy initialized!");

    #[cfg(feature = "wifi")]
    wifi::wifi_init(
        spawner,
        peripherals.TIMG0,
        peripherals.RNG,
        peripherals.RADIO_CLK,
        peripherals.WIFI,
        &SHARED,
    )
    .await;
    #[cfg(not(feature = "wifi"))]
    let _ = spawner;

    let green = Output::new(peripherals.GPIO32, Level::Low);
    let red = Output::new(peripherals.GPIO33, Level::Low);

    // ranging sensor, spot 1
    let sda = peripherals.GPIO21;
    let scl = peripherals.GPIO22;

    let i2c = match I2c::new(
        peripherals.I2C0,
        i2cConfig::default().with_frequency(HertzU32::kHz(400)),
    ) {
        Ok(i2c) => i2c.with_sda(sda).with_scl(scl),
        Err(err) => {
            error!("Error setting up i2c: {err:?}");
            halt(red).await;
        }
    };

    let mut ranging = Vl53l0x::new(i2c, EmbassyClock);
    if let Err(err) = ranging.init() {
        error!("VL53L0X init failed: {err}");
        halt(red).await;
    }
    if let Err(err) = ranging.start_continuous(0) {
        error!("VL53L0X start failed: {err}");
        halt(red).await;
    }
    info!(
        "VL53L0X ready, stop variable {:#04x}, io timeout {}",
        ranging.stop_variable(),
        ranging.io_timeout()
    );

    // ultrasonic sensor, spot 2
    let trigger = Output::new(peripherals.GPIO5, Level::Low);
    let echo = Input::new(peripherals.GPIO18, Pull::None);
    let mut ultrasonic = Hcsr04::new(trigger, echo, Delay::new(), EmbassyClock);
    if let Err(err) = ultrasonic.init() {
        error!("HC-SR04 init failed: {err:?}");
        halt(red).await;
    }

    // servo and buzzers
    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    let mut servo_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    let mut maneuver_timer = ledc.timer::<LowSpeed>(timer::Number::Timer1);
    let mut locate_timer = ledc.timer::<LowSpeed>(timer::Number::Timer2);
    for (t, duty, hz) in [
        (&mut servo_timer, timer::config::Duty::Duty14Bit, SERVO_HZ),
        (&mut maneuver_timer, timer::config::Duty::Duty10Bit, MANEUVER_TONE_HZ),
        (&mut locate_timer, timer::config::Duty::Duty10Bit, LOCATE_TONE_HZ),
    ] {
        if let Err(err) = t.configure(timer::config::Config {
            duty,
            clock_source: timer::LSClockSource::APBClk,
            frequency: HertzU32::Hz(hz),
        }) {
            error!("Error setting up ledc timer at {hz} Hz: {err:?}");
            halt(red).await;
        }
    }

    let mut servo = ledc.channel(channel::Number::Channel0, peripherals.GPIO13);
    let mut maneuver = ledc.channel(channel::Number::Channel1, peripherals.GPIO25);
    let mut locate = ledc.channel(channel::Number::Channel2, peripherals.GPIO26);
    for (ch, t) in [
        (&mut servo, &servo_timer),
        (&mut maneuver, &maneuver_timer),
        (&mut locate, &locate_timer),
    ] {
        if let Err(err) = ch.configure(channel::config::Config {
            timer: t,
            duty_pct: 0,
            pin_config: channel::config::PinConfig::PushPull,
        }) {
            error!("Error setting up ledc channel: {err:?}");
            halt(red).await;
        }
    }

    let mut actuators = PwmActuators::new(servo, green, red, maneuver, locate);

    info!("Servo self test");
    for angle in [RAISED_ANGLE, LOWERED_ANGLE, RAISED_ANGLE] {
        actuators.set_servo_angle(angle);
        Timer::after(Duration::from_millis(SERVO_TEST_STEP_MS)).await;
    }

    let mut control = ControlLoop::new(
        ranging,
        ultrasonic,
        actuators,
        LogDisplay,
        &SHARED,
        ParkingConfig::default(),
    );
    control.start();

    info!("Control loop running");
    loop {
        control.poll(EmbassyClock.now());
        Timer::after_millis(LOOP_YIELD_MS).await;
    }
}
