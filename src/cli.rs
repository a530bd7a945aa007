use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    config::{get_config_dir, get_data_dir},
    export::ExportKind,
};

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
pub struct Cli {
    /// Tick rate, i.e. number of ticks per second
    #[arg(short, long, value_name = "FLOAT", default_value_t = 4.0)]
    pub tick_rate: f64,

    /// Frame rate, i.e. number of frames per second
    #[arg(short, long, value_name = "FLOAT", default_value_t = 60.0)]
    pub frame_rate: f64,

    /// Name recorded on scans, overrides the configured user
    #[arg(short, long, value_name = "NAME")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upsert bowls from a customer/order JSON file
    Patch {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Write the selected collections as CSV sheets
    Export {
        #[arg(value_enum, default_value_t = ExportKind::All)]
        kind: ExportKind,
    },
    /// Clear prepared history and every user's scan tally
    Reset {
        /// Confirm that the history should really be removed
        #[arg(long)]
        yes: bool,
    },
}

pub fn version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let describe = option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown");
    let build_date = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown");
    let author = clap::crate_authors!();

    let config_dir_path = get_config_dir().display().to_string();
    let data_dir_path = get_data_dir().display().to_string();

    format!(
        "\
{version}-{describe} ({build_date})

Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
