//! `dedupfs`: mounts an in-memory, content-addressed deduplicating filesystem at
//! a directory via FUSE. The image is always created fresh (spec.md's explicit
//! non-goal of backing-device persistence rules out a "load existing image" path).

use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use fuser::MountOption;
use log::info;

use dedupfs_core::adapter::Session;
use dedupfs_core::fs::Fs;
use dedupfs_core::geometry::Geometry;

/// An in-memory, content-addressed deduplicating filesystem.
#[derive(Parser, Debug)]
#[command(name = "dedupfs", version, about)]
struct Args {
    /// Directory to mount the filesystem on.
    mountpoint: String,

    /// Size of one block, in bytes.
    #[arg(long, default_value_t = 4096)]
    block_size: u64,

    /// Total number of blocks carved out of the image (metadata + data).
    #[arg(long, default_value_t = 10240)]
    block_count: u64,

    /// Total number of inodes.
    #[arg(long, default_value_t = 128)]
    inode_count: u64,

    /// Run in the foreground instead of daemonising.
    #[arg(short, long)]
    foreground: bool,

    /// Allow users other than the one that mounted the filesystem to access it.
    #[arg(long)]
    allow_other: bool,

    #[command(flatten)]
    verbose: Verbosity<clap_verbosity_flag::InfoLevel>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .format_timestamp(None)
        .init();

    let geometry = Geometry {
        block_size: args.block_size,
        block_count: args.block_count,
        inode_count: args.inode_count,
    };
    info!(
        "creating image: block_size={} block_count={} inode_count={}",
        geometry.block_size, geometry.block_count, geometry.inode_count
    );

    let fs = Fs::new(geometry);
    let session = Session::new(fs);

    let mut options = vec![MountOption::FSName("dedupfs".to_string())];
    if args.allow_other {
        options.push(MountOption::AllowOther);
    }
    if !args.foreground {
        // Daemonising is the host mount layer's job (spec.md §1's "out of scope:
        // the userspace-filesystem mount layer"); `fuser` itself never forks, so
        // foreground is the only mode this binary offers either way.
        info!("--foreground not given; fuser runs the session inline regardless");
    }

    info!("mounting at {}", args.mountpoint);
    match fuser::mount2(session, &args.mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dedupfs: failed to mount {}: {e}", args.mountpoint);
            ExitCode::FAILURE
        }
    }
}
