//! wold - Wake-on-LAN daemon
//!
//! Thin wrapper around [`wold::cli::main`].

fn main() -> anyhow::Result<()> {
    wold::cli::main()
}
