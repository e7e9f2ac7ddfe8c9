//! Pressure controller commands.
//!
//! Channels are numbered 1..=8 here and sent as 0..=7.

use crate::device::DeviceId;
use crate::protocol::Command;
use crate::protocol::units::{kpa_to_wire, wire_to_kpa};
use crate::transport::Transport;

use super::Session;
use super::error::{Error, Result};

/// Number of pressure channels on one controller
pub const PRESSURE_CHANNELS: u8 = 8;

/// Largest pressure magnitude accepted, in kPa
pub const MAX_PRESSURE_KPA: f32 = 100.0;

/// Longest calibration delay, in milliseconds
pub const MAX_CALIBRATION_DELAY_MS: u32 = 10_000;

impl<T: Transport> Session<T> {
    fn channel_arg(&mut self, channel: u8) -> Result<i32> {
        if (1..=PRESSURE_CHANNELS).contains(&channel) {
            Ok(i32::from(channel) - 1)
        } else {
            Err(self.fail(Error::InvalidArg("pressure channel out of range")))
        }
    }

    /// Like [`Self::channel_arg`] but zero selects every channel
    fn optional_channel_arg(&mut self, channel: u8) -> Result<Option<i32>> {
        if channel == 0 {
            Ok(None)
        } else {
            self.channel_arg(channel).map(Some)
        }
    }

    /// Set the target pressure of a channel in kPa
    pub fn set_pressure(&mut self, dev: DeviceId, channel: u8, kpa: f32) -> Result<()> {
        let chn = self.channel_arg(channel)?;
        if !(-MAX_PRESSURE_KPA..=MAX_PRESSURE_KPA).contains(&kpa) {
            return Err(self.fail(Error::InvalidArg("pressure out of range")));
        }
        self.cmd(dev, Command::SetPressure, &[chn, kpa_to_wire(kpa)])
    }

    /// Target pressure of a channel in kPa
    pub fn get_pressure(&mut self, dev: DeviceId, channel: u8) -> Result<f32> {
        let chn = self.channel_arg(channel)?;
        self.query_keyed(dev, Command::GetPressure, chn)
            .map(wire_to_kpa)
    }

    /// Measured pressure of a channel in kPa
    pub fn measure_pressure(&mut self, dev: DeviceId, channel: u8) -> Result<f32> {
        let chn = self.channel_arg(channel)?;
        self.query_keyed(dev, Command::MeasurePressure, chn)
            .map(wire_to_kpa)
    }

    /// Raw monitor ADC reading of a channel
    pub fn get_pressure_monitor_adc(&mut self, dev: DeviceId, channel: u8) -> Result<i32> {
        let chn = self.channel_arg(channel)?;
        self.query_keyed(dev, Command::GetMonitorAdc, chn)
    }

    /// Open or close a channel valve
    pub fn set_valve(&mut self, dev: DeviceId, channel: u8, open: bool) -> Result<()> {
        let chn = self.channel_arg(channel)?;
        self.cmd(dev, Command::SetValve, &[chn, i32::from(open)])
    }

    /// Valve state of a channel
    pub fn get_valve(&mut self, dev: DeviceId, channel: u8) -> Result<bool> {
        let chn = self.channel_arg(channel)?;
        self.query_keyed(dev, Command::GetValve, chn)
            .map(|value| value != 0)
    }

    /// Clear the fluid detector latch of a channel
    pub fn reset_fluid_detector(&mut self, dev: DeviceId, channel: u8) -> Result<()> {
        let chn = self.channel_arg(channel)?;
        self.cmd(dev, Command::ResetFluidDetector, &[chn])
    }

    /// Fluid detector states, one bit per channel
    pub fn read_fluid_detectors(&mut self, dev: DeviceId) -> Result<i32> {
        let values = self.query(dev, Command::ReadFluidDetectors, &[], 1)?;
        match values.first() {
            Some(bits) => Ok(*bits),
            None => Err(self.fail(Error::InvalidResponse(
                "no fluid detector state".to_string(),
            ))),
        }
    }

    /// Zero the pressure sensor offset of one channel, or all with channel 0
    pub fn reset_sensor_offset(&mut self, dev: DeviceId, channel: u8) -> Result<()> {
        match self.optional_channel_arg(channel)? {
            Some(chn) => self.cmd(dev, Command::ResetSensorOffset, &[chn]),
            None => self.cmd(dev, Command::ResetSensorOffset, &[]),
        }
    }

    /// Calibrate one channel, or all with channel 0, after `delay_ms`
    pub fn pressure_calib(&mut self, dev: DeviceId, channel: u8, delay_ms: u32) -> Result<()> {
        let chn = self.optional_channel_arg(channel)?;
        if delay_ms > MAX_CALIBRATION_DELAY_MS {
            return Err(self.fail(Error::InvalidArg("calibration delay out of range")));
        }
        match chn {
            Some(chn) if delay_ms > 0 => {
                let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
                self.cmd(dev, Command::PressureCalib, &[chn, delay])
            }
            Some(chn) => self.cmd(dev, Command::PressureCalib, &[chn]),
            None => self.cmd(dev, Command::PressureCalib, &[]),
        }
    }
}
