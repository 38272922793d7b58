#![forbid(unsafe_code)]

pub mod directory;
pub mod models;
pub mod notifier;
pub mod partner_submission_service;
pub mod repository;
pub mod utils;
