// src/models/mod.rs

pub mod dashboard;
pub mod question;
pub mod quiz;
pub mod quiz_answer;
pub mod staged;
pub mod statement;
pub mod student;
