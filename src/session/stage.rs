//! Microscope stage commands: lens changer, objectives and bowl control

use crate::device::DeviceId;
use crate::protocol::Command;
use crate::protocol::units::{is_undef, mm_to_wire, nm_to_um, um_to_nm, wire_to_mm};
use crate::transport::Transport;

use super::Session;
use super::error::{Error, Result};

/// Most bowl centres one bowl control command carries
pub const MAX_BOWL_CENTERS: usize = 24;

/// Highest lens changer position
pub const MAX_LENS_POSITION: u8 = 9;

/// Largest objective magnification accepted
pub const MAX_MAGNIFICATION: i32 = 1000;

const BOWL_HEADER_LEN: usize = 5;
const OBJECTIVE_CONF_LEN: usize = 4;

/// One objective: magnification and position offsets in µm
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectiveConf {
    /// Magnification, 1..=1000
    pub mag: i32,
    /// X offset in µm
    pub x_offset: f32,
    /// Y offset in µm
    pub y_offset: f32,
    /// Z offset in µm
    pub z_offset: f32,
}

impl ObjectiveConf {
    fn to_args(self) -> [i32; OBJECTIVE_CONF_LEN] {
        [
            self.mag,
            um_to_nm(self.x_offset),
            um_to_nm(self.y_offset),
            um_to_nm(self.z_offset),
        ]
    }

    fn from_values(values: &[i32]) -> Self {
        let um = |index: usize| values.get(index).copied().and_then(nm_to_um).unwrap_or(0.0);
        Self {
            mag: values.first().copied().unwrap_or(0),
            x_offset: um(1),
            y_offset: um(2),
            z_offset: um(3),
        }
    }
}

/// Centre of one bowl, in mm
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BowlCenter {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

/// Bowl collision avoidance settings, lengths in mm.
///
/// An empty centre list disables the feature.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BowlControl {
    /// Objective outer diameter
    pub objective_od: f32,
    /// Bowl inner diameter
    pub bowl_id: f32,
    /// Highest focus position where the stage may move freely
    pub z_limit_low: f32,
    /// Highest focus position before the objective touches the bowl
    pub z_limit_high: f32,
    /// Bowl centres
    pub centers: Vec<BowlCenter>,
}

impl<T: Transport> Session<T> {
    /// Move the lens changer to `position`.
    ///
    /// `lift` (µm) raises the objective before the change and `dip` (µm)
    /// lowers it afterwards; NaN leaves either to the device. A dip is only
    /// sent together with a lift.
    pub fn set_lens_position(
        &mut self,
        dev: DeviceId,
        position: u8,
        lift: f32,
        dip: f32,
    ) -> Result<()> {
        if position > MAX_LENS_POSITION {
            return Err(self.fail(Error::InvalidArg("lens position out of range")));
        }
        if lift < 0.0 || dip < 0.0 {
            return Err(self.fail(Error::InvalidArg("negative lift or dip")));
        }
        let mut args = vec![i32::from(position)];
        if !is_undef(lift) {
            args.push(um_to_nm(lift));
            if !is_undef(dip) {
                args.push(um_to_nm(dip));
            }
        }
        self.cmd(dev, Command::UmsSetLensPosition, &args)
    }

    /// Current lens changer position; zero when unknown or centred
    pub fn get_lens_position(&mut self, dev: DeviceId) -> Result<i32> {
        let values = self.query(dev, Command::UmsGetLensPosition, &[], 1)?;
        match values.first() {
            Some(-1) => Ok(0),
            Some(position) => Ok(*position),
            None => Err(self.fail(Error::InvalidResponse("no lens position".to_string()))),
        }
    }

    /// Store the configuration of both objectives
    pub fn set_objective_configuration(
        &mut self,
        dev: DeviceId,
        first: &ObjectiveConf,
        second: &ObjectiveConf,
    ) -> Result<()> {
        let magnifications = 1..=MAX_MAGNIFICATION;
        if !magnifications.contains(&first.mag) || !magnifications.contains(&second.mag) {
            return Err(self.fail(Error::InvalidArg("magnification out of range")));
        }
        let mut args = [0; 2 * OBJECTIVE_CONF_LEN];
        args[..OBJECTIVE_CONF_LEN].copy_from_slice(&first.to_args());
        args[OBJECTIVE_CONF_LEN..].copy_from_slice(&second.to_args());
        self.cmd(dev, Command::UmsSetObjectiveControl, &args)
    }

    /// Read the configuration of both objectives
    pub fn get_objective_configuration(
        &mut self,
        dev: DeviceId,
    ) -> Result<(ObjectiveConf, ObjectiveConf)> {
        let request = super::Request::new(dev, Command::UmsGetObjectiveControl).with_response();
        let block = self.send_request(&request)?;
        let values: Vec<i32> = match block {
            Some(block) if block.count() == 2 * OBJECTIVE_CONF_LEN => block.values().collect(),
            _ => {
                return Err(self.fail(Error::InvalidResponse(
                    "objective configuration needs 8 values".to_string(),
                )));
            }
        };
        Ok((
            ObjectiveConf::from_values(&values[..OBJECTIVE_CONF_LEN]),
            ObjectiveConf::from_values(&values[OBJECTIVE_CONF_LEN..]),
        ))
    }

    /// Store bowl control settings
    pub fn set_bowl_control(&mut self, dev: DeviceId, control: &BowlControl) -> Result<()> {
        if control.centers.len() > MAX_BOWL_CENTERS {
            return Err(self.fail(Error::InvalidArg("too many bowl centers")));
        }
        let mut args = Vec::with_capacity(BOWL_HEADER_LEN + 2 * control.centers.len());
        args.push(i32::try_from(control.centers.len()).unwrap_or(0));
        args.push(mm_to_wire(control.objective_od));
        args.push(mm_to_wire(control.bowl_id));
        args.push(mm_to_wire(control.z_limit_low));
        args.push(mm_to_wire(control.z_limit_high));
        for center in &control.centers {
            args.push(mm_to_wire(center.x));
            args.push(mm_to_wire(center.y));
        }
        self.cmd(dev, Command::UmsSetBowlControl, &args)
    }

    /// Read bowl control settings
    pub fn get_bowl_control(&mut self, dev: DeviceId) -> Result<BowlControl> {
        let values = self.query(
            dev,
            Command::UmsGetBowlControl,
            &[],
            BOWL_HEADER_LEN + 2 * MAX_BOWL_CENTERS,
        )?;
        if values.len() < BOWL_HEADER_LEN {
            return Err(self.fail(Error::InvalidResponse(
                "bowl control header missing".to_string(),
            )));
        }
        let count = match usize::try_from(values[0]) {
            Ok(count) if count <= MAX_BOWL_CENTERS => count,
            _ => {
                return Err(self.fail(Error::InvalidResponse(format!(
                    "bowl count {} out of range",
                    values[0]
                ))));
            }
        };
        let centers = values[BOWL_HEADER_LEN..]
            .chunks_exact(2)
            .take(count)
            .map(|pair| BowlCenter {
                x: wire_to_mm(pair[0]),
                y: wire_to_mm(pair[1]),
            })
            .collect();
        Ok(BowlControl {
            objective_od: wire_to_mm(values[1]),
            bowl_id: wire_to_mm(values[2]),
            z_limit_low: wire_to_mm(values[3]),
            z_limit_high: wire_to_mm(values[4]),
            centers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_args() {
        let conf = ObjectiveConf {
            mag: 40,
            x_offset: 1.5,
            y_offset: -2.0,
            z_offset: 0.0,
        };
        assert_eq!(conf.to_args(), [40, 1500, -2000, 0]);
        assert_eq!(ObjectiveConf::from_values(&conf.to_args()), conf);
    }
}
