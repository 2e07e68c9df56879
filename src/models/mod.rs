//! Domain model module declarations.

pub mod decision;
pub mod session;
pub mod time_info;
