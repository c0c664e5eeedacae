use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ironscan_app::twain::FileFormat;

#[derive(Clone, Debug)]
pub struct Config {
    pub log_file: Option<String>,
    pub dsm_path: Option<PathBuf>,
    pub prefer_legacy: bool,
    pub command: Command,
}

#[derive(Clone, Debug)]
pub enum Command {
    /// Enumerate the installed sources.
    List,
    /// Print the default source.
    Default,
    /// Let the user pick the default source.
    Select,
    Acquire(AcquireConfig),
}

#[derive(Clone, Debug)]
pub struct AcquireConfig {
    /// Product name of the source, the default source when `None`.
    pub source: Option<String>,
    pub show_ui: bool,
    pub ui_only: bool,
    pub mode: TransferMode,
    pub output_dir: PathBuf,
    pub format: ImageFormat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TransferMode {
    /// Images are handed over in memory and released right away.
    Native,
    /// The source writes every image to a file in the output directory.
    File,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ImageFormat {
    Bmp,
    Tiff,
    Png,
    Jpeg,
    Pdf,
}

impl ImageFormat {
    pub fn file_format(self) -> FileFormat {
        match self {
            Self::Bmp => FileFormat::BMP,
            Self::Tiff => FileFormat::TIFF,
            Self::Png => FileFormat::PNG,
            Self::Jpeg => FileFormat::JFIF,
            Self::Pdf => FileFormat::PDF,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Pdf => "pdf",
        }
    }
}

/// Devolutions ironscan
#[derive(Parser, Debug)]
#[clap(author = "Devolutions", about = "TWAIN scanning from the command line")]
#[clap(version, long_about = None)]
struct Args {
    /// A file with ironscan logs
    #[clap(short, long, value_parser)]
    log_file: Option<String>,

    /// Load the data source manager from this library instead of the system one
    #[clap(long, value_parser)]
    dsm_path: Option<PathBuf>,

    /// Prefer the legacy data source manager (32-bit Windows only)
    #[clap(long)]
    prefer_legacy: bool,

    #[clap(subcommand)]
    command: CommandArgs,
}

#[derive(Subcommand, Debug)]
enum CommandArgs {
    /// List the installed sources
    List,
    /// Show the default source
    Default,
    /// Show the source selection dialog and make the choice the default
    Select,
    /// Acquire images from a source
    Acquire {
        /// Product name of the source to use instead of the default one
        #[clap(short, long, value_parser)]
        source: Option<String>,

        /// Show the user interface of the source
        #[clap(long)]
        show_ui: bool,

        /// Only show the settings dialog of the source, without scanning
        #[clap(long, requires("show_ui"))]
        ui_only: bool,

        /// How images are handed over
        #[clap(long, value_enum, value_parser, default_value_t = TransferMode::Native)]
        mode: TransferMode,

        /// Directory receiving the images in file mode
        #[clap(short, long, value_parser, default_value = ".")]
        output_dir: PathBuf,

        /// Image file format in file mode
        #[clap(long, value_enum, value_parser, default_value_t = ImageFormat::Png)]
        format: ImageFormat,
    },
}

impl Config {
    pub fn parse_args() -> anyhow::Result<Self> {
        let args = Args::parse();

        let command = match args.command {
            CommandArgs::List => Command::List,
            CommandArgs::Default => Command::Default,
            CommandArgs::Select => Command::Select,
            CommandArgs::Acquire {
                source,
                show_ui,
                ui_only,
                mode,
                output_dir,
                format,
            } => {
                if mode == TransferMode::File && !output_dir.is_dir() {
                    anyhow::bail!("output directory {} does not exist", output_dir.display());
                }

                Command::Acquire(AcquireConfig {
                    source,
                    show_ui,
                    ui_only,
                    mode,
                    output_dir,
                    format,
                })
            }
        };

        Ok(Self {
            log_file: args.log_file,
            dsm_path: args.dsm_path,
            prefer_legacy: args.prefer_legacy,
            command,
        })
    }
}
