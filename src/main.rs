use std::env;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use virtfs_overlay::{VfsConfig, VirtFs};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: virtfs <config.toml> [virtual dir]");
        return Ok(());
    };
    let dir = args.next().unwrap_or_default();

    let config = VfsConfig::load(&config_path)?;
    let vfs = VirtFs::from_config(&config)?;

    for mount in vfs.mounts() {
        match &mount.subdir {
            Some(subdir) => println!("# {} {} ({subdir})", mount.kind, mount.path),
            None => println!("# {} {}", mount.kind, mount.path),
        }
    }

    let mut names = vfs.enumerate_files(&dir)?;
    names.sort();
    for name in names {
        let path = virtfs_overlay::join_path(&dir, &name);
        let marker = if vfs.is_directory(&path)? { "/" } else { "" };
        match vfs.get_real_dir(&path)? {
            Some(real) => println!("{path}{marker}\t{}", real.display()),
            None => println!("{path}{marker}"),
        }
    }

    Ok(())
}
