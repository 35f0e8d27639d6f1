// boardsim: host side of the board simulator (configuration and the inspection API)

pub mod config;
pub mod web;
