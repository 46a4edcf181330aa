use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Inspect a scene through a proxy shape: bounds per time, selection and ray queries
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Scene description (JSON) to open
    #[arg(value_name = "FILE")]
    pub file_path: Option<String>,

    /// Prim the proxy represents (default: pseudo-root)
    #[arg(short = 'p', long = "prim", value_name = "PATH")]
    pub prim_path: Option<String>,

    /// Prim paths to prune, comma-separated (can be given multiple times)
    #[arg(short = 'x', long = "exclude", value_name = "PATHS")]
    pub exclude: Vec<String>,

    /// Evaluation times (can be given multiple times)
    #[arg(short = 't', long = "time", value_name = "T", allow_negative_numbers = true)]
    pub times: Vec<f64>,

    /// Draw complexity, clamped to 0..=8
    #[arg(long = "complexity", value_name = "N")]
    pub complexity: Option<i32>,

    /// Include render-purpose geometry
    #[arg(long = "render")]
    pub render: bool,

    /// Exclude proxy-purpose geometry
    #[arg(long = "no-proxy")]
    pub no_proxy: bool,

    /// Include guide-purpose geometry
    #[arg(long = "guide")]
    pub guide: bool,

    /// Ray query in shape space: origin and direction
    #[arg(long = "ray", value_names = ["OX", "OY", "OZ", "DX", "DY", "DZ"], num_args = 6, allow_negative_numbers = true)]
    pub ray: Option<Vec<f64>>,

    /// Extra directory searched for relative asset paths (repeatable)
    #[arg(short = 's', long = "search-path", value_name = "DIR")]
    pub search_paths: Vec<PathBuf>,

    /// Print the report as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Enable logging to file (default: usdproxy.log in the config dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Exclude paths joined into the attribute's comma-separated form.
    pub fn exclude_attr(&self) -> String {
        self.exclude.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let args = Args::parse_from([
            "usdproxy", "scene.json", "-p", "/World/Geo", "-t", "1", "-t", "2.5", "-x", "/A,/B", "-x", "/C",
            "--ray", "0", "0", "-5", "0", "0", "1", "--json", "-vv",
        ]);
        assert_eq!(args.file_path.as_deref(), Some("scene.json"));
        assert_eq!(args.times, vec![1.0, 2.5]);
        assert_eq!(args.exclude_attr(), "/A,/B,/C");
        assert_eq!(args.ray, Some(vec![0.0, 0.0, -5.0, 0.0, 0.0, 1.0]));
        assert!(args.json);
        assert_eq!(args.verbosity, 2);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["usdproxy"]);
        assert!(args.file_path.is_none());
        assert!(args.times.is_empty());
        assert!(args.log_file.is_none());
    }
}
