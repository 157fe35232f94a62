use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "plcblocks-rs",
    about = "Generate PLC program block import documents from a JSON project description."
)]
pub struct Args {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(
        value_name = "OUTPUT",
        help = "Project directory to import the generated blocks into."
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        help = "Directory holding master copy libraries (defaults to 'libraries' next to INPUT)."
    )]
    pub library_root: Option<PathBuf>,

    #[arg(long, help = "Write every generated document to this directory.")]
    pub emit_xml: Option<PathBuf>,

    #[arg(
        long = "block",
        value_name = "NAME",
        help = "Only generate the named block (repeatable)."
    )]
    pub blocks: Vec<String>,

    #[arg(long, help = "Indent documents written with --emit-xml.")]
    pub pretty: bool,

    #[arg(short, long, help = "Log debug output to stderr.")]
    pub verbose: bool,
}
