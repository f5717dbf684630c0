//! Gamepad axis and button mapping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest deadzone a mapping may request
pub const MAX_DEADZONE: f32 = 0.5;

/// Discrete actions a gamepad button can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    ZoomIn,
    ZoomOut,
    Stop,
    PresetStoreToggle,
}

impl ButtonAction {
    pub const ALL: [ButtonAction; 4] = [
        ButtonAction::ZoomIn,
        ButtonAction::ZoomOut,
        ButtonAction::Stop,
        ButtonAction::PresetStoreToggle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::ZoomIn => "zoom_in",
            ButtonAction::ZoomOut => "zoom_out",
            ButtonAction::Stop => "stop",
            ButtonAction::PresetStoreToggle => "preset_store_toggle",
        }
    }
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which physical axes and buttons drive the camera.
///
/// Indices that do not exist on the device read as "no reading": axis value
/// zero, button never pressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputMapping {
    pub pan_axis: usize,
    pub tilt_axis: usize,
    pub zoom_axis: usize,
    pub invert_pan: bool,
    pub invert_tilt: bool,
    pub invert_zoom: bool,
    pub deadzone: f32,
    pub buttons: BTreeMap<ButtonAction, usize>,
}

impl Default for InputMapping {
    fn default() -> Self {
        let buttons = ButtonAction::ALL
            .iter()
            .enumerate()
            .map(|(index, action)| (*action, index))
            .collect();
        Self {
            pan_axis: 0,
            tilt_axis: 1,
            zoom_axis: 3,
            invert_pan: false,
            invert_tilt: false,
            invert_zoom: false,
            deadzone: 0.1,
            buttons,
        }
    }
}

impl InputMapping {
    /// Deadzone clamped to `[0, MAX_DEADZONE]`; NaN reads as no deadzone
    pub fn effective_deadzone(&self) -> f32 {
        if self.deadzone.is_nan() {
            return 0.0;
        }
        self.deadzone.clamp(0.0, MAX_DEADZONE)
    }

    /// Copy of the mapping with the deadzone clamped into range
    pub fn sanitized(mut self) -> Self {
        self.deadzone = self.effective_deadzone();
        self
    }

    pub fn button(&self, action: ButtonAction) -> Option<usize> {
        self.buttons.get(&action).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let mapping = InputMapping::default();
        assert_eq!((mapping.pan_axis, mapping.tilt_axis, mapping.zoom_axis), (0, 1, 3));
        assert_eq!(mapping.deadzone, 0.1);
        assert_eq!(mapping.button(ButtonAction::ZoomIn), Some(0));
        assert_eq!(mapping.button(ButtonAction::ZoomOut), Some(1));
        assert_eq!(mapping.button(ButtonAction::Stop), Some(2));
        assert_eq!(mapping.button(ButtonAction::PresetStoreToggle), Some(3));
    }

    #[test]
    fn test_deadzone_clamped() {
        let mut mapping = InputMapping::default();
        mapping.deadzone = 0.9;
        assert_eq!(mapping.effective_deadzone(), MAX_DEADZONE);
        mapping.deadzone = -1.0;
        assert_eq!(mapping.clone().sanitized().deadzone, 0.0);
        mapping.deadzone = f32::NAN;
        assert_eq!(mapping.effective_deadzone(), 0.0);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let mapping: InputMapping =
            serde_json::from_str(r#"{"zoom_axis": 2, "invert_tilt": true, "buttons": {"stop": 7}}"#)
                .unwrap();
        assert_eq!(mapping.zoom_axis, 2);
        assert!(mapping.invert_tilt);
        assert_eq!(mapping.pan_axis, 0);
        assert_eq!(mapping.button(ButtonAction::Stop), Some(7));
        assert_eq!(mapping.button(ButtonAction::ZoomIn), None);
    }

    #[test]
    fn test_json_keys_are_snake_case() {
        let json = serde_json::to_value(InputMapping::default()).unwrap();
        assert_eq!(json["buttons"]["preset_store_toggle"], 3);
        assert_eq!(json["pan_axis"], 0);
    }
}
