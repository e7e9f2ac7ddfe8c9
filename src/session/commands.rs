//! Manipulator commands, parameters and the position cache

use std::time::Instant;

use crate::device::{Axis, DeviceId, address, group};
use crate::protocol::units::{self, is_undef, speed_arg, um_to_nm};
use crate::protocol::{
    ARG_UNDEF, Command, DeviceStatus, DriveStatus, Options, ext_feature, feature, param,
};
use crate::transport::Transport;

use super::config::TimeLimit;
use super::error::{Error, Result};
use super::log::session_log;
use super::{Session, timestamp_ms, timestamp_us};

/// Number of uMa registers reachable with one bulk command
pub const UMA_REG_COUNT: usize = 10;

/// Highest device id reserved for controllers and hosts
const RESERVED_ID_END: u16 = 0x1000;

/// Positions returned by [`Session::get_positions`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRead {
    /// Axis positions in µm; `None` for axes the device does not report
    pub positions: [Option<f32>; 4],
    /// Age of cached values, or duration of the device query, in ms
    pub elapsed_ms: u64,
}

impl PositionRead {
    /// Position of one axis
    #[must_use]
    pub const fn axis(&self, axis: Axis) -> Option<f32> {
        self.positions[axis.index()]
    }
}

impl<T: Transport> Session<T> {
    /// Liveness probe
    pub fn ping(&mut self, dev: DeviceId) -> Result<()> {
        self.cmd(dev, Command::Ping, &[])
    }

    /// Stop all movement of one device
    pub fn stop(&mut self, dev: DeviceId) -> Result<()> {
        self.cmd(dev, Command::Stop, &[])
    }

    /// Stop every device on the network
    pub fn stop_all(&mut self) -> Result<()> {
        self.stop(DeviceId::from(group::ALL_DEVICES))
    }

    /// Drive the axes in `axis_mask` to zero; an empty mask means all
    pub fn init_zero(&mut self, dev: DeviceId, axis_mask: i32) -> Result<()> {
        if axis_mask == 0 {
            self.cmd(dev, Command::InitZero, &[])
        } else {
            self.cmd(dev, Command::InitZero, &[axis_mask])
        }
    }

    /// Store the current position as zero
    pub fn save_zero(&mut self, dev: DeviceId) -> Result<()> {
        self.cmd(dev, Command::SaveZero, &[])
    }

    /// Calibrate the load of a manipulator
    pub fn calibrate_load(&mut self, dev: DeviceId) -> Result<()> {
        self.cmd(dev, Command::Calibrate, &[0])
    }

    /// Turn the device LEDs off (and block movement) or back on
    pub fn led_control(&mut self, dev: DeviceId, off: bool) -> Result<()> {
        self.set_feature(dev, feature::PREVENT_MOVEMENT, off)?;
        if off {
            self.cmd(dev, Command::Sleep, &[0])
        } else {
            self.cmd(dev, Command::Wakeup, &[])
        }
    }

    /// Drive to an absolute position.
    ///
    /// Positions are µm, NaN leaves an axis where it is. `speed` is µm/s
    /// shared by all axes; trailing zero arguments are not sent.
    pub fn goto_position(
        &mut self,
        dev: DeviceId,
        positions: [f32; 4],
        speed: f32,
        mode: i32,
        max_acc: i32,
    ) -> Result<()> {
        if positions.into_iter().any(units::is_invalid_position) {
            return Err(self.fail(Error::InvalidArg("position out of range")));
        }
        if speed < 0.0 {
            return Err(self.fail(Error::InvalidArg("negative speed")));
        }
        let [x, y, z, d] = positions;
        let mut args = vec![um_to_nm(x), um_to_nm(y), um_to_nm(z)];
        if !is_undef(d) || speed != 0.0 || mode != 0 {
            args.push(um_to_nm(d));
        }
        if speed != 0.0 || mode != 0 || max_acc != 0 {
            args.push(speed_arg(speed));
        }
        push_mode(&mut args, mode, max_acc);

        let result = self.cmd(dev, Command::GotoPos, &args);
        self.record_drive_start(dev, result.is_ok());
        result
    }

    /// Drive to an absolute position with a speed per axis.
    ///
    /// Every specified axis needs a positive speed. The first argument block
    /// also carries the highest speed for devices that only read one.
    pub fn goto_position_ext(
        &mut self,
        dev: DeviceId,
        positions: [f32; 4],
        speeds: [f32; 4],
        mode: i32,
        max_acc: i32,
    ) -> Result<()> {
        if positions.into_iter().any(units::is_invalid_position) {
            return Err(self.fail(Error::InvalidArg("position out of range")));
        }
        if positions
            .iter()
            .zip(speeds)
            .any(|(position, speed)| !is_undef(*position) && speed <= 0.0)
        {
            return Err(self.fail(Error::InvalidArg("moving axis without speed")));
        }

        let mut args: Vec<i32> = positions.into_iter().map(um_to_nm).collect();
        let max_speed = speeds.into_iter().fold(speeds[0], f32::max);
        args.push(speed_arg(max_speed));
        push_mode(&mut args, mode, max_acc);

        let per_axis = positions
            .iter()
            .rposition(|position| !is_undef(*position))
            .map_or(0, |last| last + 1);
        let args2: Vec<i32> = speeds[..per_axis].iter().map(|s| speed_arg(*s)).collect();

        let result = self
            .send_request(
                &super::Request::new(dev, Command::GotoPos)
                    .args(&args)
                    .args2(&args2),
            )
            .map(|_| ());
        self.record_drive_start(dev, result.is_ok());
        result
    }

    /// Relative step.
    ///
    /// `steps` are µm, `speeds` µm/s. A non-zero step needs a non-zero
    /// speed; axes that do not step get speed zero. Mode zero picks the
    /// closed-loop mode from the slowest moving axis.
    pub fn take_step(
        &mut self,
        dev: DeviceId,
        steps: [f32; 4],
        speeds: [i32; 4],
        mode: i32,
        max_acc: i32,
    ) -> Result<()> {
        let mut speeds = speeds;
        for (step, speed) in steps.iter().zip(speeds.iter_mut()) {
            if *step == 0.0 {
                *speed = 0;
            } else if *speed == 0 {
                return Err(self.fail(Error::InvalidArg("step without speed")));
            }
        }

        let mut args: Vec<i32> = steps.into_iter().map(um_to_nm).collect();
        args.extend_from_slice(&speeds);
        let cls = if mode == 0 {
            closed_loop_mode(&steps, &speeds)
        } else {
            mode
        };
        args.push(cls.max(0));
        if max_acc != 0 {
            args.push(max_acc);
        }
        self.cmd(dev, Command::TakeStep, &args)
    }

    /// Positions of `dev`, from the cache when it is fresh enough
    pub fn get_positions(&mut self, dev: DeviceId, limit: TimeLimit) -> Result<PositionRead> {
        let id = self.wire_id(dev)?;
        let cached = self.cache.positions(id);
        let age_ms = cached.age_ms(timestamp_us());
        if cache_is_usable(limit, age_ms) && cached.known_axes() > 0 {
            return Ok(PositionRead {
                positions: cached.all_um(),
                elapsed_ms: age_ms.unwrap_or(0),
            });
        }

        let start = Instant::now();
        self.query_positions(dev, id)?;
        Ok(PositionRead {
            positions: self.cache.positions(id).all_um(),
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Refresh the position cache unless it is fresh enough.
    ///
    /// Returns the number of known axes.
    pub fn read_positions(&mut self, dev: DeviceId, limit: TimeLimit) -> Result<usize> {
        let id = self.wire_id(dev)?;
        let cached = self.cache.positions(id);
        if cache_is_usable(limit, cached.age_ms(timestamp_us())) && cached.known_axes() > 0 {
            return Ok(cached.known_axes());
        }
        self.query_positions(dev, id)
    }

    fn query_positions(&mut self, dev: DeviceId, id: u16) -> Result<usize> {
        let values = self.query(dev, Command::GetPositions, &[], 4)?;
        let updated = self.cache.update_positions(id, &values, timestamp_us());
        session_log!(self.logger, 3, "get_positions", "{id} read {values:?}");
        Ok(updated)
    }

    /// Cached position of one axis in µm; zero when unknown
    pub fn get_position(&mut self, dev: DeviceId, axis: Axis) -> Result<f32> {
        let id = self.wire_id(dev)?;
        Ok(self.cache.positions(id).um(axis).unwrap_or(0.0))
    }

    /// Speeds derived from the last two position updates, in µm/s
    pub fn get_speeds(&mut self, dev: DeviceId) -> Result<[f32; 4]> {
        let id = self.wire_id(dev)?;
        Ok(self.cache.positions(id).speed)
    }

    /// Derived speed of one axis; zero before any position update
    pub fn get_speed(&mut self, dev: DeviceId, axis: Axis) -> Result<f32> {
        let id = self.wire_id(dev)?;
        let positions = self.cache.positions(id);
        if positions.updated_us.is_none() {
            return Ok(0.0);
        }
        Ok(positions.speed[axis.index()])
    }

    /// Last status word reported by the device
    pub fn get_status(&mut self, dev: DeviceId) -> Result<DeviceStatus> {
        let id = self.wire_id(dev)?;
        Ok(self.cache.status(id))
    }

    /// Whether the last status word shows the device busy
    pub fn is_busy(&mut self, dev: DeviceId) -> Result<bool> {
        self.get_status(dev).map(DeviceStatus::is_busy)
    }

    /// Drive state of `dev`.
    ///
    /// A drive still busy although the status word has shown no activity for
    /// over a second is taken to have completed with a lost notification.
    pub fn get_drive_status(&mut self, dev: DeviceId) -> Result<DriveStatus> {
        let id = self.wire_id(dev)?;
        if let Some(elapsed) = self.cache.refresh_drive_status(id, timestamp_ms()) {
            session_log!(
                self.logger,
                1,
                "get_drive_status",
                "stuck drive status on {dev}, last busy {elapsed}ms ago"
            );
        }
        Ok(self.cache.drive_status(id))
    }

    fn record_drive_start(&mut self, dev: DeviceId, started: bool) {
        if let Some(id) = address::wire_id(dev) {
            let status = if started {
                DriveStatus::Busy
            } else {
                DriveStatus::Failed
            };
            self.cache.set_drive_status(id, status, timestamp_ms());
        }
    }

    /// Write a device parameter
    pub fn set_param(&mut self, dev: DeviceId, param_id: i32, value: i32) -> Result<()> {
        self.cmd(dev, Command::SetParameter, &[param_id, value])
    }

    /// Read a device parameter
    pub fn get_param(&mut self, dev: DeviceId, param_id: i32) -> Result<i32> {
        self.query_keyed(dev, Command::GetParameter, param_id)
    }

    /// Enable or disable a feature
    pub fn set_feature(&mut self, dev: DeviceId, feature_id: i32, enabled: bool) -> Result<()> {
        self.cmd(dev, Command::SetFeature, &[feature_id, i32::from(enabled)])
    }

    /// Read a feature state
    pub fn get_feature(&mut self, dev: DeviceId, feature_id: i32) -> Result<bool> {
        self.query_keyed(dev, Command::GetFeature, feature_id)
            .map(|value| value != 0)
    }

    /// Enable or disable an extended feature
    pub fn set_ext_feature(&mut self, dev: DeviceId, feature_id: i32, enabled: bool) -> Result<()> {
        self.cmd(dev, Command::SetExtFeature, &[feature_id, i32::from(enabled)])
    }

    /// Read an extended feature state
    pub fn get_ext_feature(&mut self, dev: DeviceId, feature_id: i32) -> Result<bool> {
        self.query_keyed(dev, Command::GetExtFeature, feature_id)
            .map(|value| value != 0)
    }

    /// Read a feature mask word
    pub fn get_feature_mask(&mut self, dev: DeviceId, feature_id: i32) -> Result<i32> {
        self.query_keyed(dev, Command::GetFeatureMask, feature_id)
    }

    /// Read what a feature does on this device
    pub fn get_feature_functionality(&mut self, dev: DeviceId, feature_id: i32) -> Result<i32> {
        self.query_keyed(dev, Command::GetFeatureFunctionality, feature_id)
    }

    /// Custom slow speed mode
    pub fn set_slow_speed_mode(&mut self, dev: DeviceId, enabled: bool) -> Result<()> {
        self.set_ext_feature(dev, ext_feature::CUST_LOW_SPEED, enabled)
    }

    /// Whether custom slow speed mode is on
    pub fn get_slow_speed_mode(&mut self, dev: DeviceId) -> Result<bool> {
        self.get_ext_feature(dev, ext_feature::CUST_LOW_SPEED)
    }

    /// Soft start mode
    pub fn set_soft_start_mode(&mut self, dev: DeviceId, enabled: bool) -> Result<()> {
        self.set_ext_feature(dev, ext_feature::SOFT_START, enabled)
    }

    /// Whether soft start mode is on
    pub fn get_soft_start_mode(&mut self, dev: DeviceId) -> Result<bool> {
        self.get_ext_feature(dev, ext_feature::SOFT_START)
    }

    /// Firmware version words, at most `max_len` of them
    pub fn read_version(&mut self, dev: DeviceId, max_len: usize) -> Result<Vec<i32>> {
        self.query(dev, Command::GetVersion, &[], max_len)
    }

    /// Free-form device description
    pub fn get_info_text(&mut self, dev: DeviceId) -> Result<String> {
        let request = super::Request::new(dev, Command::GetInfoText).with_response();
        Ok(self
            .send_request(&request)?
            .map(|block| block.text())
            .unwrap_or_default())
    }

    /// Number of axes the device has
    pub fn get_axis_count(&mut self, dev: DeviceId) -> Result<i32> {
        self.get_param(dev, param::AXIS_COUNT)
    }

    /// Angle of the virtual axis in degrees
    pub fn get_axis_angle(&mut self, dev: DeviceId) -> Result<f32> {
        let axis = if self.get_axis_count(dev)? == 4 { 3 } else { 0 };
        let values = self.query(dev, Command::GetAxisAngle, &[axis, 1], 1)?;
        match values.first() {
            #[allow(clippy::cast_precision_loss)]
            Some(tenths) => Ok(*tenths as f32 / 10.0),
            None => Err(self.fail(Error::InvalidResponse("no axis angle".to_string()))),
        }
    }

    /// Whether the manipulator head is configured left-handed
    pub fn get_handedness_configuration(&mut self, dev: DeviceId) -> Result<bool> {
        self.get_param(dev, param::AXIS_HEAD_CONFIGURATION)
            .map(|config| config & (1 << 1) != 0)
    }

    /// Discover devices on the network.
    ///
    /// Broadcasts a ping asking for ACKs, collects traffic for one timeout
    /// and lists every device with a known address. Direct addresses are
    /// reported as serial numbers; controller and host ids are skipped.
    pub fn get_device_list(&mut self) -> Result<Vec<DeviceId>> {
        self.cmd_options(Options::REQ_ACK)?;
        match self.ping(DeviceId::from(group::ALL_DEVICES)) {
            Ok(()) | Err(Error::Timeout | Error::InvalidDevice(_)) => {}
            Err(err) => return Err(err),
        }
        self.receive(self.timeout_ms)?;

        Ok(self
            .cache
            .known_devices()
            .into_iter()
            .filter(|id| !(group::ALL_DEVICES..=RESERVED_ID_END).contains(id))
            .map(|id| address::to_serial(id).unwrap_or(DeviceId::from(id)))
            .collect())
    }

    /// Forget every learned device address; returns how many there were
    pub fn clear_device_list(&mut self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.cache.clear_addresses())
    }

    /// Whether a unicast address is known for `dev`
    pub fn has_unicast_address(&mut self, dev: DeviceId) -> Result<bool> {
        let id = self.wire_id(dev)?;
        Ok(self.cache.address(id).is_some())
    }

    /// Write one uMa register
    pub fn set_uma_reg(&mut self, dev: DeviceId, reg: i32, value: i32) -> Result<()> {
        self.cmd(dev, Command::SetUmaReg, &[reg, value])
    }

    /// Read one uMa register
    pub fn get_uma_reg(&mut self, dev: DeviceId, reg: i32) -> Result<i32> {
        self.query_keyed(dev, Command::GetUmaReg, reg)
    }

    /// Write the first `values.len()` uMa registers
    pub fn set_uma_regs(&mut self, dev: DeviceId, values: &[i32]) -> Result<()> {
        if values.is_empty() || values.len() > UMA_REG_COUNT {
            return Err(self.fail(Error::InvalidArg("register count out of range")));
        }
        self.cmd(dev, Command::SetUmaRegs, values)
    }

    /// Read the first `count` uMa registers
    pub fn get_uma_regs(&mut self, dev: DeviceId, count: usize) -> Result<Vec<i32>> {
        if count == 0 || count > UMA_REG_COUNT {
            return Err(self.fail(Error::InvalidArg("register count out of range")));
        }
        self.query(dev, Command::GetUmaRegs, &[], count)
    }
}

fn cache_is_usable(limit: TimeLimit, age_ms: Option<u64>) -> bool {
    match limit {
        TimeLimit::CacheOnly => true,
        TimeLimit::Force => false,
        TimeLimit::Millis(ms) => age_ms.is_some_and(|age| age < u64::from(ms)),
    }
}

fn push_mode(args: &mut Vec<i32>, mode: i32, max_acc: i32) {
    if mode != 0 || max_acc != 0 {
        args.push(mode);
    }
    if max_acc != 0 {
        args.push(max_acc);
    }
}

/// Closed-loop mode for a step: 1 for slow, 2 for very slow, else 0
fn closed_loop_mode(steps: &[f32; 4], speeds: &[i32; 4]) -> i32 {
    let slowest = steps
        .iter()
        .zip(speeds)
        .filter(|(step, speed)| **step != 0.0 && **speed > 0 && **speed != ARG_UNDEF)
        .map(|(_, speed)| *speed)
        .min()
        .map_or(1000, |speed| speed.min(1000));
    match slowest {
        10..=50 => 1,
        s if s < 10 => 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_loop_mode() {
        let steps = [1.0, 0.0, 0.0, 0.0];
        assert_eq!(closed_loop_mode(&steps, &[1000, 0, 0, 0]), 0);
        assert_eq!(closed_loop_mode(&steps, &[50, 0, 0, 0]), 1);
        assert_eq!(closed_loop_mode(&steps, &[10, 0, 0, 0]), 1);
        assert_eq!(closed_loop_mode(&steps, &[9, 0, 0, 0]), 2);
        assert_eq!(closed_loop_mode(&[0.0; 4], &[0; 4]), 0);
        // only moving axes count
        assert_eq!(closed_loop_mode(&[1.0, 0.0, 0.0, 0.0], &[500, 5, 0, 0]), 0);
        assert_eq!(closed_loop_mode(&[1.0, 2.0, 0.0, 0.0], &[500, 20, 0, 0]), 1);
    }

    #[test]
    fn test_cache_is_usable() {
        assert!(cache_is_usable(TimeLimit::CacheOnly, None));
        assert!(!cache_is_usable(TimeLimit::Force, Some(0)));
        assert!(cache_is_usable(TimeLimit::Millis(20), Some(19)));
        assert!(!cache_is_usable(TimeLimit::Millis(20), Some(20)));
        assert!(!cache_is_usable(TimeLimit::Millis(20), None));
    }

    #[test]
    fn test_push_mode() {
        let mut args = Vec::new();
        push_mode(&mut args, 0, 0);
        assert!(args.is_empty());
        push_mode(&mut args, 0, 5);
        assert_eq!(args, vec![0, 5]);
    }
}
