//! Geometry and configuration values used by the floor-plan editor.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use gestiona_core::{DomainError, DomainResult};

/// Canvas of a salon in editor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorPlan {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background_image: Option<String>,
    /// Zoom applied by the editor, in percent.
    #[serde(default = "default_scale")]
    pub scale_percent: u32,
    #[serde(default = "default_grid")]
    pub grid_size: u32,
}

fn default_scale() -> u32 {
    100
}

fn default_grid() -> u32 {
    10
}

impl Default for FloorPlan {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            background_image: None,
            scale_percent: default_scale(),
            grid_size: default_grid(),
        }
    }
}

impl FloorPlan {
    pub fn validate(&self) -> DomainResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DomainError::validation("floor plan dimensions must be positive"));
        }
        if !(10..=400).contains(&self.scale_percent) {
            return Err(DomainError::validation("floor plan scale must be between 10% and 400%"));
        }
        Ok(())
    }

    /// Whether a table anchored at `position` lies on the canvas.
    pub fn contains(&self, position: &Position) -> bool {
        position.x >= 0
            && position.y >= 0
            && position.x as u32 <= self.width
            && position.y as u32 <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    /// Degrees, normalised into `0..360`.
    #[serde(default)]
    pub rotation: i32,
}

impl Position {
    pub fn normalized(self) -> Self {
        Self {
            rotation: self.rotation.rem_euclid(360),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { width: 80, height: 80 }
    }
}

impl Dimensions {
    pub fn validate(&self) -> DomainResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DomainError::validation("table dimensions must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableShape {
    #[default]
    Square,
    Rectangle,
    Round,
    Oval,
    Bar,
}

/// Seating bounds of a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub min: u32,
    pub max: u32,
}

impl Default for Capacity {
    fn default() -> Self {
        Self { min: 1, max: 4 }
    }
}

/// Most seats a single table can declare.
pub const MAX_TABLE_SEATS: u32 = 100;

impl Capacity {
    pub fn validate(&self) -> DomainResult<()> {
        if self.max > MAX_TABLE_SEATS {
            return Err(DomainError::validation(format!(
                "maximum capacity cannot exceed {MAX_TABLE_SEATS}"
            )));
        }
        if self.min == 0 {
            return Err(DomainError::validation("minimum capacity must be at least 1"));
        }
        if self.min > self.max {
            return Err(DomainError::validation(
                "minimum capacity cannot exceed maximum capacity",
            ));
        }
        Ok(())
    }
}

/// One opening slot. `closes` earlier than `opens` means the slot runs past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    /// ISO weekday, 1 = Monday.
    pub weekday: u8,
    pub opens: String,
    pub closes: String,
}

impl OpeningHours {
    pub fn validate(&self) -> DomainResult<()> {
        if !(1..=7).contains(&self.weekday) {
            return Err(DomainError::validation("weekday must be between 1 and 7"));
        }
        let opens = parse_hhmm(&self.opens)?;
        let closes = parse_hhmm(&self.closes)?;
        if opens == closes {
            return Err(DomainError::validation(
                "opening and closing time cannot be equal",
            ));
        }
        Ok(())
    }
}

fn parse_hhmm(value: &str) -> DomainResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| DomainError::validation(format!("'{value}' is not a HH:MM time")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SalonFeatures {
    pub smoking: bool,
    pub climate_control: bool,
    pub exterior: bool,
    pub accessible: bool,
    pub private: bool,
}
