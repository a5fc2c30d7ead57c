use super::test_helpers::*;
use super::*;
use crate::error::{Error, TaskError};
use crate::settings::keys;
use crate::types::TaskStatus;
use std::time::Duration;

mod control;
mod remote_monitor;
