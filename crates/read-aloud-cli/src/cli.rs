use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "read-aloud", version)]
pub struct Args {
    /// Page fixture (JSON) to attach read-aloud controls to
    #[arg(long, required_unless_present = "list_devices")]
    pub page: Option<PathBuf>,

    /// Reader options (TOML); re-read on `refresh`
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory relative audio URLs are resolved against (defaults to the page's directory)
    #[arg(long)]
    pub media_root: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Output sample rate to request from the device
    #[arg(long, default_value_t = read_aloud_audio::device::PREFERRED_RATE)]
    pub rate: u32,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

/// Element reference typed on stdin: a numeric element id or `#id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Index(u64),
    Id(String),
}

/// One stdin command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Click(Target),
    TouchStart(Target, usize),
    TouchEnd(Target, usize),
    Refresh,
    Stop,
    Status,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  click <el>                 activate an element
  touch-start <el> [n]       touch start with n contacts (default 1)
  touch-end <el> [n]         touch end with n contacts still down (default 0)
  refresh                    re-read options and decorate new matches
  stop                       stop playback
  status                     print playback status as JSON
  show                       print the page
  quit                       exit
<el> is a numeric element id or #html-id";

impl Line {
    /// Parse a command line. Blank lines yield `None`.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let mut words = input.split_whitespace();
        let Some(cmd) = words.next() else {
            return Ok(None);
        };
        let line = match cmd {
            "click" => Line::Click(target(words.next())?),
            "touch-start" => {
                let t = target(words.next())?;
                Line::TouchStart(t, contacts(words.next(), 1)?)
            }
            "touch-end" => {
                let t = target(words.next())?;
                Line::TouchEnd(t, contacts(words.next(), 0)?)
            }
            "refresh" => Line::Refresh,
            "stop" => Line::Stop,
            "status" => Line::Status,
            "show" => Line::Show,
            "help" | "?" => Line::Help,
            "quit" | "exit" => Line::Quit,
            other => bail!("unknown command {other:?}; try `help`"),
        };
        if let Some(extra) = words.next() {
            bail!("unexpected argument {extra:?}");
        }
        Ok(Some(line))
    }
}

fn target(word: Option<&str>) -> Result<Target> {
    let word = word.ok_or_else(|| anyhow!("missing element"))?;
    if let Some(id) = word.strip_prefix('#') {
        if id.is_empty() {
            bail!("empty element id");
        }
        return Ok(Target::Id(id.to_string()));
    }
    let index = word
        .parse::<u64>()
        .with_context(|| format!("invalid element {word:?}"))?;
    Ok(Target::Index(index))
}

fn contacts(word: Option<&str>, default: usize) -> Result<usize> {
    match word {
        Some(w) => w.parse().with_context(|| format!("invalid contact count {w:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_activation_commands() {
        assert_eq!(Line::parse("click 3").unwrap(), Some(Line::Click(Target::Index(3))));
        assert_eq!(
            Line::parse("  click   #intro ").unwrap(),
            Some(Line::Click(Target::Id("intro".to_string())))
        );
        assert_eq!(
            Line::parse("touch-start 2").unwrap(),
            Some(Line::TouchStart(Target::Index(2), 1))
        );
        assert_eq!(
            Line::parse("touch-start 2 2").unwrap(),
            Some(Line::TouchStart(Target::Index(2), 2))
        );
        assert_eq!(
            Line::parse("touch-end 2").unwrap(),
            Some(Line::TouchEnd(Target::Index(2), 0))
        );
    }

    #[test]
    fn parses_control_commands() {
        assert_eq!(Line::parse("refresh").unwrap(), Some(Line::Refresh));
        assert_eq!(Line::parse("stop").unwrap(), Some(Line::Stop));
        assert_eq!(Line::parse("status").unwrap(), Some(Line::Status));
        assert_eq!(Line::parse("show").unwrap(), Some(Line::Show));
        assert_eq!(Line::parse("exit").unwrap(), Some(Line::Quit));
        assert_eq!(Line::parse("   ").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        for input in ["click", "click x", "click #", "touch-start 1 many", "stop now", "dance"] {
            assert!(Line::parse(input).is_err(), "{input}");
        }
    }

    #[test]
    fn args_require_page_unless_listing() {
        assert!(Args::try_parse_from(["read-aloud"]).is_err());
        let args = Args::try_parse_from(["read-aloud", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        let args = Args::try_parse_from(["read-aloud", "--page", "page.json", "--device", "usb"]).unwrap();
        assert_eq!(args.page, Some(PathBuf::from("page.json")));
        assert_eq!(args.device.as_deref(), Some("usb"));
        assert_eq!(args.rate, 48_000);
    }
}
