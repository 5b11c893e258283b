//! A top like dashboard for cgroup (v1) hierarchies and the containers behind them.

pub mod actions;
pub mod app;
pub mod canvas;
pub mod collection;
pub mod events;
pub mod stats;
pub mod utils;
pub mod widgets;
