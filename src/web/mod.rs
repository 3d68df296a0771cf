//! HTML surface: askama page and fragment handlers

pub mod handlers;
