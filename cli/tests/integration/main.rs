//! Integration test entry point — drives the compiled `outpost` binary
//! against throwaway data homes.

mod helpers;
mod lifecycle;
mod modules_command;
mod update_command;
