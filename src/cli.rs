use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Host each client window in its own compositor surface instead of a
    /// shared root.
    #[arg(long)]
    pub rootless: bool,
    /// Use the CPU copy path instead of the accelerated renderer.
    #[arg(long)]
    pub software: bool,
    /// Double the resolution of the hosted screen.
    #[arg(long)]
    pub doubled: bool,
    /// Target DPI for physical-dimension calculations.
    #[arg(long, default_value_t = 96)]
    pub dpi: u32,
    /// Initial width of the hosted window.
    #[arg(long, default_value_t = 1280)]
    pub width: u16,
    /// Initial height of the hosted window.
    #[arg(long, default_value_t = 800)]
    pub height: u16,
}
