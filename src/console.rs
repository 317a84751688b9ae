//! Line-oriented operator console read from stdin.

use std::fmt::Write as _;

use crate::dispatch::{DispatchCommand, DispatchStatus};
use crate::engine::{clamp_volume, EngineKind};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleRequest {
    Start,
    Stop,
    Engine(EngineKind),
    Speed(f32),
    Volume(u8),
    Voice(String),
    Voices,
    Test,
    Diag,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start | stop              listen to the clipboard or pause
  engine <native|process>   switch speech engine
  speed <0.5-2.0>           speaking rate multiplier
  volume <0-100>            output volume
  voice <name>              select a voice (downloads Piper voices)
  voices                    list voices of the current engine
  test                      speak a test sentence
  diag                      print diagnostics
  status                    show state and recent messages
  quit";

/// Parse one line of operator input.  Blank lines are an error the caller
/// is expected to ignore.
pub fn parse_line(line: &str) -> Result<ConsoleRequest, String> {
    let line = line.trim();
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let require_arg = |what: &str| {
        if arg.is_empty() {
            Err(format!("usage: {verb} <{what}>"))
        } else {
            Ok(arg)
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "" => Err("empty command".into()),
        "start" => Ok(ConsoleRequest::Start),
        "stop" => Ok(ConsoleRequest::Stop),
        "engine" => require_arg("native|process")?
            .parse()
            .map(ConsoleRequest::Engine),
        "speed" => {
            let speed: f32 = require_arg("speed")?
                .trim_end_matches('x')
                .parse()
                .map_err(|_| format!("invalid speed '{arg}'"))?;
            if !speed.is_finite() {
                return Err(format!("invalid speed '{arg}'"));
            }
            Ok(ConsoleRequest::Speed(speed))
        }
        "volume" => {
            let volume: u32 = require_arg("0-100")?
                .trim_end_matches('%')
                .parse()
                .map_err(|_| format!("invalid volume '{arg}'"))?;
            Ok(ConsoleRequest::Volume(clamp_volume(volume.min(u8::MAX as u32) as u8)))
        }
        "voice" => require_arg("name").map(|v| ConsoleRequest::Voice(v.to_string())),
        "voices" => Ok(ConsoleRequest::Voices),
        "test" => Ok(ConsoleRequest::Test),
        "diag" | "diagnose" => Ok(ConsoleRequest::Diag),
        "status" => Ok(ConsoleRequest::Status),
        "help" | "?" => Ok(ConsoleRequest::Help),
        "quit" | "exit" => Ok(ConsoleRequest::Quit),
        other => Err(format!("unknown command '{other}' (try 'help')")),
    }
}

impl ConsoleRequest {
    /// The dispatch command this request maps to, for requests the loop
    /// handles directly.
    pub fn into_command(self) -> Option<DispatchCommand> {
        match self {
            ConsoleRequest::Start => Some(DispatchCommand::Start),
            ConsoleRequest::Stop => Some(DispatchCommand::Stop),
            ConsoleRequest::Engine(kind) => Some(DispatchCommand::SwitchEngine(kind)),
            ConsoleRequest::Speed(speed) => Some(DispatchCommand::SetSpeed(speed)),
            ConsoleRequest::Volume(volume) => Some(DispatchCommand::SetVolume(volume)),
            ConsoleRequest::Voice(voice) => Some(DispatchCommand::SetVoice(voice)),
            ConsoleRequest::Test => Some(DispatchCommand::SpeakTest),
            ConsoleRequest::Quit => Some(DispatchCommand::Shutdown),
            ConsoleRequest::Voices
            | ConsoleRequest::Diag
            | ConsoleRequest::Status
            | ConsoleRequest::Help => None,
        }
    }
}

/// Status block for the `status` command.
pub fn render_status(status: &DispatchStatus, engine: Option<&str>, lines: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | engine: {} | spoken: {}",
        status.listen.label(),
        engine.unwrap_or("not initialized"),
        status.speak_count
    );
    let _ = writeln!(out, "{}", status.settings_line);
    if let Some(last) = &status.last_spoken {
        let _ = writeln!(out, "last: {last}");
    }
    for line in status.log.tail(lines) {
        let _ = writeln!(out, "{line}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ListenState;

    #[test]
    fn parses_simple_verbs() {
        assert_eq!(parse_line("start"), Ok(ConsoleRequest::Start));
        assert_eq!(parse_line("  STOP "), Ok(ConsoleRequest::Stop));
        assert_eq!(parse_line("exit"), Ok(ConsoleRequest::Quit));
        assert_eq!(parse_line("voices"), Ok(ConsoleRequest::Voices));
    }

    #[test]
    fn parses_engine_names() {
        assert_eq!(
            parse_line("engine piper"),
            Ok(ConsoleRequest::Engine(EngineKind::Process))
        );
        assert_eq!(
            parse_line("engine native"),
            Ok(ConsoleRequest::Engine(EngineKind::Native))
        );
        assert!(parse_line("engine espeak").is_err());
        assert!(parse_line("engine").unwrap_err().contains("usage"));
    }

    #[test]
    fn parses_speed_and_volume() {
        assert_eq!(parse_line("speed 1.5"), Ok(ConsoleRequest::Speed(1.5)));
        assert_eq!(parse_line("speed 0.8x"), Ok(ConsoleRequest::Speed(0.8)));
        assert!(parse_line("speed fast").is_err());
        assert!(parse_line("speed NaN").is_err());

        assert_eq!(parse_line("volume 80%"), Ok(ConsoleRequest::Volume(80)));
        assert_eq!(parse_line("volume 999"), Ok(ConsoleRequest::Volume(100)));
        assert!(parse_line("volume -1").is_err());
    }

    #[test]
    fn voice_keeps_full_name() {
        assert_eq!(
            parse_line("voice Microsoft Zira Desktop"),
            Ok(ConsoleRequest::Voice("Microsoft Zira Desktop".into()))
        );
    }

    #[test]
    fn rejects_blank_and_unknown_lines() {
        assert!(parse_line("   ").is_err());
        assert!(parse_line("dance").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn only_loop_requests_map_to_commands() {
        assert!(matches!(
            ConsoleRequest::Test.into_command(),
            Some(DispatchCommand::SpeakTest)
        ));
        assert!(matches!(
            ConsoleRequest::Quit.into_command(),
            Some(DispatchCommand::Shutdown)
        ));
        assert!(ConsoleRequest::Status.into_command().is_none());
        assert!(ConsoleRequest::Diag.into_command().is_none());
    }

    #[test]
    fn status_block_shows_state_and_recent_lines() {
        let mut status = DispatchStatus::new(10);
        status.listen = ListenState::Listening;
        status.settings_line = "voice: alpha | speed: 1.0x | volume: 100%".into();
        status.log.info("Speaking: hello");

        let text = render_status(&status, Some("System TTS"), 5);
        assert!(text.starts_with("Listening | engine: System TTS | spoken: 0"));
        assert!(text.contains("volume: 100%"));
        assert!(text.contains("Speaking: hello"));
    }
}
