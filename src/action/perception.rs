//! The narrow screen capability actions are allowed to use.
//!
//! Locating elements and synthesizing input live outside this crate; an
//! implementation is injected into each action at construction.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Screen coordinates of a located element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangular screen area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Opaque reference to something the perception layer knows how to find,
/// typically a template image key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementRef {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("Input failed: {0}")]
    Input(String),

    #[error("Text recognition failed: {0}")]
    Recognition(String),
}

/// Element lookup and synthetic input.
pub trait Perception: Send + Sync {
    fn find(&self, element: &ElementRef) -> Option<Location>;

    fn find_all(&self, element: &ElementRef) -> Vec<Location>;

    fn click_at(&self, at: Location) -> Result<(), PerceptionError>;

    /// Wait a humanized amount of time in `[min_secs, max_secs]` and return
    /// the seconds actually waited.
    fn wait(&self, min_secs: f64, max_secs: f64) -> f64;

    fn read_text(&self, region: Region) -> Result<String, PerceptionError>;

    /// Locate `element` and click it. `false` when it is not on screen or
    /// the click could not be delivered.
    fn find_and_click(&self, element: &ElementRef) -> bool {
        match self.find(element) {
            Some(at) => self.click_at(at).is_ok(),
            None => false,
        }
    }
}

/// Finds nothing and waits for nothing. Used when actions are only
/// rehearsed, never executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPerception;

impl Perception for NullPerception {
    fn find(&self, _element: &ElementRef) -> Option<Location> {
        None
    }

    fn find_all(&self, _element: &ElementRef) -> Vec<Location> {
        Vec::new()
    }

    fn click_at(&self, _at: Location) -> Result<(), PerceptionError> {
        Ok(())
    }

    fn wait(&self, min_secs: f64, _max_secs: f64) -> f64 {
        min_secs.max(0.0)
    }

    fn read_text(&self, _region: Region) -> Result<String, PerceptionError> {
        Ok(String::new())
    }
}
