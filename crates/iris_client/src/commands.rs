use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr, VariantNames};

/// Keyboard-driven actions of the segmentation workspace
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkspaceCommand {
    PreviousImage,
    NextImage,
    SaveMask,
    Undo,
    Redo,
    SelectClass,
    ToolMove,
    ToolResetViews,
    ToolDraw,
    ToolEraser,
    ResetMask,
    PredictMask,
    ToggleMask,
    MaskFinal,
    MaskUser,
    MaskErrors,
    ToggleContrast,
    ToggleInvert,
    BrightnessUp,
    BrightnessDown,
    SaturationUp,
    SaturationDown,
    ResetFilters,
    ShowViewControls,
    NextViewGroup,
}

impl WorkspaceCommand {
    pub fn hotkey(&self) -> &'static str {
        match self {
            Self::PreviousImage => "Backspace",
            Self::NextImage => "Return",
            Self::SaveMask => "S",
            Self::Undo => "U",
            Self::Redo => "R",
            Self::SelectClass => "1 .. 9",
            Self::ToolMove => "W",
            Self::ToolResetViews => "Z",
            Self::ToolDraw => "D",
            Self::ToolEraser => "E",
            Self::ResetMask => "N",
            Self::PredictMask => "A",
            Self::ToggleMask => "Space",
            Self::MaskFinal => "F",
            Self::MaskUser => "G",
            Self::MaskErrors => "H",
            Self::ToggleContrast => "C",
            Self::ToggleInvert => "I",
            Self::BrightnessUp => "Arrow-Up",
            Self::BrightnessDown => "Arrow-Down",
            Self::SaturationUp => "Arrow-Right",
            Self::SaturationDown => "Arrow-Left",
            Self::ResetFilters => "X",
            Self::ShowViewControls => "V",
            Self::NextViewGroup => "B",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PreviousImage => "Save this image and open previous one",
            Self::NextImage => "Save this image and open next one",
            Self::SaveMask => "Save current mask",
            Self::Undo => "Undo last modification",
            Self::Redo => "Redo modification",
            Self::SelectClass => "Select class for drawing",
            Self::ToolMove => "Pan current view",
            Self::ToolResetViews => "Reset all views",
            Self::ToolDraw => "Draw pixels",
            Self::ToolEraser => "Erase previously drawn pixels",
            Self::ResetMask => "Clear the whole mask",
            Self::PredictMask => "AI prediction",
            Self::ToggleMask => "Toggle mask on/off",
            Self::MaskFinal => "Show final mask",
            Self::MaskUser => "Show user mask",
            Self::MaskErrors => "Show mask errors",
            Self::ToggleContrast => "Toggle contrast",
            Self::ToggleInvert => "Toggle inversion",
            Self::BrightnessUp => "Increase brightness",
            Self::BrightnessDown => "Decrease brightness",
            Self::SaturationUp => "Increase saturation",
            Self::SaturationDown => "Decrease saturation",
            Self::ResetFilters => "Reset filters",
            Self::ShowViewControls => "Toggle view controls",
            Self::NextViewGroup => "Show next view group",
        }
    }

    /// Commands that talk to the backend
    pub fn needs_backend(&self) -> bool {
        matches!(
            self,
            Self::PreviousImage | Self::NextImage | Self::SaveMask | Self::PredictMask
        )
    }

    /// Look a command up by its key label (case-insensitive); digit keys
    /// select a class.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.len() == 1 && key.chars().all(|c| ('1'..='9').contains(&c)) {
            return Some(Self::SelectClass);
        }
        Self::iter().find(|command| command.hotkey().eq_ignore_ascii_case(key))
    }

    /// Key label to description map sent to `POST /help/`
    pub fn hotkey_table() -> BTreeMap<String, String> {
        Self::iter()
            .map(|command| (command.hotkey().to_string(), command.description().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotkey_table_has_every_command() {
        let table = WorkspaceCommand::hotkey_table();
        assert_eq!(table.len(), WorkspaceCommand::VARIANTS.len());
        assert_eq!(table["S"], "Save current mask");
        assert_eq!(table["Arrow-Left"], "Decrease saturation");
    }

    #[test]
    fn test_from_key() {
        assert_eq!(WorkspaceCommand::from_key("u"), Some(WorkspaceCommand::Undo));
        assert_eq!(WorkspaceCommand::from_key("space"), Some(WorkspaceCommand::ToggleMask));
        assert_eq!(WorkspaceCommand::from_key("7"), Some(WorkspaceCommand::SelectClass));
        assert_eq!(WorkspaceCommand::from_key("0"), None);
        assert_eq!(WorkspaceCommand::from_key("Q"), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(WorkspaceCommand::NextImage.to_string(), "next_image");
        assert_eq!(
            "mask_errors".parse::<WorkspaceCommand>().unwrap(),
            WorkspaceCommand::MaskErrors
        );
        assert!(WorkspaceCommand::PredictMask.needs_backend());
        assert!(!WorkspaceCommand::Undo.needs_backend());
    }
}
