// src/models/mod.rs

pub mod course;
pub mod login_log;
pub mod question;
pub mod score;
pub mod user;
