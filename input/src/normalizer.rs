//! Raw readings to normalized pan/tilt/zoom and button edges
//!
//! Both functions are pure: the polling session owns the device and the
//! previous button states and threads them through each tick.

use crate::mapping::{ButtonAction, InputMapping};
use std::collections::{BTreeMap, HashMap};

/// One normalized sample, each component in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisValues {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

impl AxisValues {
    pub const ZERO: AxisValues = AxisValues {
        pan: 0.0,
        tilt: 0.0,
        zoom: 0.0,
    };

    pub fn as_tuple(&self) -> (f32, f32, f32) {
        (self.pan, self.tilt, self.zoom)
    }
}

/// A button transition for a mapped action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub action: ButtonAction,
    pub pressed: bool,
}

/// Previous pressed state per physical button
pub type ButtonStates = HashMap<usize, bool>;

fn shape(raw: Option<f32>, invert: bool, deadzone: f32) -> f32 {
    let mut value = raw.unwrap_or(0.0);
    if invert {
        value = -value;
    }
    if value.abs() < deadzone {
        0.0
    } else {
        value
    }
}

/// Read the mapped axes, apply inversion then deadzone.
///
/// `read_axis` returns `None` for axes the device does not have.
pub fn normalize<F>(read_axis: F, mapping: &InputMapping) -> AxisValues
where
    F: Fn(usize) -> Option<f32>,
{
    let deadzone = mapping.effective_deadzone();
    AxisValues {
        pan: shape(read_axis(mapping.pan_axis), mapping.invert_pan, deadzone),
        tilt: shape(read_axis(mapping.tilt_axis), mapping.invert_tilt, deadzone),
        zoom: shape(read_axis(mapping.zoom_axis), mapping.invert_zoom, deadzone),
    }
}

/// Compare current button states against `previous` and report transitions.
///
/// Buttons `read_button` does not know about never fire and keep whatever
/// state they had. Actions sharing a button each get their own event.
pub fn detect_edges<F>(
    read_button: F,
    buttons: &BTreeMap<ButtonAction, usize>,
    previous: &ButtonStates,
) -> (Vec<ButtonEvent>, ButtonStates)
where
    F: Fn(usize) -> Option<bool>,
{
    let mut current = previous.clone();
    for index in buttons.values() {
        if let Some(pressed) = read_button(*index) {
            current.insert(*index, pressed);
        }
    }

    let events = buttons
        .iter()
        .filter_map(|(action, index)| {
            let now = *current.get(index)?;
            let before = previous.get(index).copied().unwrap_or(false);
            (now != before).then_some(ButtonEvent {
                action: *action,
                pressed: now,
            })
        })
        .collect();

    (events, current)
}
