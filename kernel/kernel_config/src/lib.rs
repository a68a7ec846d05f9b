//! Compile-time configuration of the kernel's timer subsystem.

#![no_std]

pub mod time;
