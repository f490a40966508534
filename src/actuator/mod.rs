//! Browser-automation layer
//!
//! This module contains:
//! - The `Actuator` capability set the crawl core drives
//! - Ordered element locators
//! - A W3C WebDriver implementation of the actuator

mod locator;
mod traits;
mod webdriver;

pub use locator::{fill_all, Locator, Strategy};
pub use traits::{
    condition_met, Actuator, ActuatorError, ActuatorFactory, ActuatorResult, Condition, Element,
    CONDITION_POLL_INTERVAL, LOCATE_POLL_INTERVAL,
};
pub use webdriver::{session_capabilities, WebDriverFactory, WebDriverSession};
