//! One-shot hardware peripheral initialization and raw pin access.
//!
//! Configures GPIO directions and the LEDC tone channels using raw ESP-IDF
//! sys calls.  Called once from `main()` before the control loop starts.
//! Host builds get no-op stubs so every driver above this layer is testable.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcInitFailed,
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed => write!(f, "LEDC timer/channel config failed"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the control loop; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_gpio_outputs()?;
        init_ledc()?;
    }
    info!("hw: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw(sim): peripheral init skipped");
    Ok(())
}

/// Install the GPIO ISR service and hook the frame-sync edge handler.
#[cfg(target_os = "espidf")]
pub fn install_frame_isr() -> Result<(), HwInitError> {
    unsafe extern "C" fn on_frame_edge(_arg: *mut core::ffi::c_void) {
        // esp_timer_get_time is ISR-safe.
        crate::devices::frame_sync::frame_isr(now_ms());
    }

    // SAFETY: Called once from main() after init_peripherals(); the
    // handler touches only the critical-section capture cell.
    unsafe {
        let rc = gpio_install_isr_service(0);
        if rc != ESP_OK as i32 && rc != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(rc));
        }
        let rc = gpio_isr_handler_add(
            pins::FRAME_SYNC_GPIO,
            Some(on_frame_edge),
            core::ptr::null_mut(),
        );
        if rc != ESP_OK as i32 {
            return Err(HwInitError::IsrInstallFailed(rc));
        }
    }
    info!("hw: frame-sync ISR installed");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install_frame_isr() -> Result<(), HwInitError> {
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    let input_pins = [pins::LEVER_RH_GPIO, pins::LEVER_LH_GPIO, pins::LICK_GPIO];

    for &pin in &input_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    // Frame-sync line fires an ISR on every rising edge (one per frame).
    let frame_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FRAME_SYNC_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    let ret = unsafe { gpio_config(&frame_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    info!("hw: GPIO inputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe to call from main context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    false
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let output_pins = [
        pins::PUMP_GPIO,
        pins::PUMP2_GPIO,
        pins::STIM_GPIO,
        pins::FRAME_TRIG_GPIO,
    ];

    for &pin in &output_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe { gpio_set_level(pin, 0) };
    }

    info!("hw: GPIO outputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an already-configured output pin;
    // pin was validated during init_gpio_outputs(). Main-loop only.
    unsafe {
        gpio_set_level(pin, if high { 1 } else { 0 });
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

// ── Tone output (LEDC) ────────────────────────────────────────

/// LEDC channel per speaker pin.  Channel 0 drives the primary cue,
/// channel 1 the counterbalance cue.
#[cfg(target_os = "espidf")]
fn tone_channel(pin: i32) -> u32 {
    if pin == pins::CUE2_GPIO {
        ledc_channel_t_LEDC_CHANNEL_1
    } else {
        ledc_channel_t_LEDC_CHANNEL_0
    }
}

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    // SAFETY: Called from single main-task context via init_peripherals().
    let timer = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: 2000,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    if unsafe { ledc_timer_config(&timer) } != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed);
    }

    for (ch, gpio) in [
        (ledc_channel_t_LEDC_CHANNEL_0, pins::CUE_GPIO),
        (ledc_channel_t_LEDC_CHANNEL_1, pins::CUE2_GPIO),
    ] {
        let cfg = ledc_channel_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel: ch,
            timer_sel: ledc_timer_t_LEDC_TIMER_0,
            gpio_num: gpio,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        };
        if unsafe { ledc_channel_config(&cfg) } != ESP_OK as i32 {
            return Err(HwInitError::LedcInitFailed);
        }
    }

    info!("hw: LEDC tone channels configured");
    Ok(())
}

/// Start a square-wave tone on a speaker pin.
#[cfg(target_os = "espidf")]
pub fn tone_start(pin: i32, freq_hz: u32) {
    let ch = tone_channel(pin);
    // SAFETY: channel was configured in init_ledc(); main-loop only.
    unsafe {
        ledc_set_freq(
            ledc_mode_t_LEDC_LOW_SPEED_MODE,
            ledc_timer_t_LEDC_TIMER_0,
            freq_hz.max(1),
        );
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, ch, 128);
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, ch);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn tone_start(_pin: i32, _freq_hz: u32) {}

/// Silence a speaker pin.
#[cfg(target_os = "espidf")]
pub fn tone_stop(pin: i32) {
    let ch = tone_channel(pin);
    // SAFETY: channel was configured in init_ledc(); main-loop only.
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, ch, 0);
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, ch);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn tone_stop(_pin: i32) {}

// ── Time base ─────────────────────────────────────────────────

/// Milliseconds since boot, truncated to u32.
#[cfg(target_os = "espidf")]
pub fn now_ms() -> u32 {
    // SAFETY: esp_timer_get_time reads a monotonic hardware counter.
    let us = unsafe { esp_timer_get_time() };
    (us / 1000) as u32
}

#[cfg(not(target_os = "espidf"))]
pub fn now_ms() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Hardware entropy for seeding the session RNG.
#[cfg(target_os = "espidf")]
pub fn entropy_u64() -> u64 {
    // SAFETY: esp_random draws from the hardware RNG, callable any time
    // after boot.
    let hi = unsafe { esp_random() } as u64;
    let lo = unsafe { esp_random() } as u64;
    (hi << 32) | lo
}

#[cfg(not(target_os = "espidf"))]
pub fn entropy_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5EED)
}
