//! wol - Wake-on-LAN client
//!
//! Thin wrapper around [`wol_cli::cli::main`].

fn main() -> anyhow::Result<()> {
    wol_cli::cli::main()
}
