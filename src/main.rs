use std::env;

use anyhow::{anyhow, Context, Result};

use sphere_compute::{run_headless, run_windowed, RenderConfig, WindowInitError};

const USAGE: &str = "Usage: sphere-compute [--headless] [--frames N] [--spheres N] [--pixel-size N] [--fps N] [-h|--help]";
const DEFAULT_HEADLESS_FRAMES: u64 = 60;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    if options.help {
        println!("{USAGE}");
        return Ok(());
    }
    let config = options.config();
    config.validate().context("invalid configuration")?;

    if options.headless {
        println!("{}", run_headless(&config, options.frames)?);
        return Ok(());
    }

    match run_windowed(config.clone()) {
        Ok(frames) => {
            println!("Presented {frames} frames");
            Ok(())
        }
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --headless mode (set DISPLAY or WAYLAND_DISPLAY to open a window)."
            );
            println!("{}", run_headless(&config, options.frames)?);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

struct CliOptions {
    help: bool,
    headless: bool,
    frames: u64,
    spheres: Option<u32>,
    pixel_size: Option<u32>,
    fps: Option<u32>,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            help: false,
            headless: false,
            frames: DEFAULT_HEADLESS_FRAMES,
            spheres: None,
            pixel_size: None,
            fps: None,
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--frames" => options.frames = parse_value(&arg, args.next())?,
                "--spheres" => options.spheres = Some(parse_value(&arg, args.next())?),
                "--pixel-size" => options.pixel_size = Some(parse_value(&arg, args.next())?),
                "--fps" => options.fps = Some(parse_value(&arg, args.next())?),
                "-h" | "--help" => {
                    options.help = true;
                    break;
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }
        Ok(options)
    }

    fn config(&self) -> RenderConfig {
        let defaults = RenderConfig::default();
        RenderConfig {
            sphere_count: self.spheres.unwrap_or(defaults.sphere_count),
            pixel_size: self.pixel_size.unwrap_or(defaults.pixel_size),
            target_fps: self.fps.unwrap_or(defaults.target_fps),
            ..defaults
        }
    }
}

fn parse_value<T>(flag: &str, value: Option<String>) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = value.ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))?;
    value
        .parse()
        .with_context(|| format!("invalid value for {flag}: {value}"))
}
