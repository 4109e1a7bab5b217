//! `outpost version` — print the CLI version.

use anyhow::Result;

/// Run `outpost version`.
///
/// # Errors
///
/// Never fails; the signature matches the other command handlers.
pub fn run() -> Result<()> {
    println!("{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
