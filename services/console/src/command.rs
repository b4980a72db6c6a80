use bedside_core::{InteractionMode, mode::ParseModeError};

pub const HELP: &str = "\
Commands:
  /scenarios          list the available scenarios
  /select <name>      start a conversation for a scenario (use 'Custom' for your own)
  /custom <text>      set the custom scenario text
  /mode text|voice    switch between typing and speaking
  /mic                turn the microphone on or off (voice mode)
  /evaluate           show the rubric for the conversation so far
  /history            show the conversation so far
  /help               show this help
  /quit               wait for outstanding replies and exit
Any other line is sent to the patient. While dictating, prefix a line with '~' to
send it as an interim (unfinished) result.";

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Scenarios,
    Select(String),
    Custom(String),
    Mode(InteractionMode),
    Mic,
    Evaluate,
    History,
    Help,
    Quit,
    /// Anything that isn't a command: a message to the patient.
    Say(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command '/{0}'. Type /help for the list of commands.")]
    Unknown(String),
    #[error("/{0} needs an argument. Type /help for usage.")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Mode(#[from] ParseModeError),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Ok(Command::Say(line.to_string()));
        };
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest.trim_end(), ""),
        };
        let required = |name: &'static str| {
            if argument.is_empty() {
                Err(CommandError::MissingArgument(name))
            } else {
                Ok(argument.to_string())
            }
        };

        match name.to_lowercase().as_str() {
            "scenarios" => Ok(Command::Scenarios),
            "select" => required("select").map(Command::Select),
            "custom" => required("custom").map(Command::Custom),
            "mode" => Ok(Command::Mode(required("mode")?.parse()?)),
            "mic" => Ok(Command::Mic),
            "evaluate" => Ok(Command::Evaluate),
            "history" => Ok(Command::History),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/scenarios").unwrap(), Command::Scenarios);
        assert_eq!(
            Command::parse("/select   Lung cancer ").unwrap(),
            Command::Select("Lung cancer".into())
        );
        assert_eq!(
            Command::parse("/custom Tell a runner their knee needs surgery").unwrap(),
            Command::Custom("Tell a runner their knee needs surgery".into())
        );
        assert_eq!(
            Command::parse("/mode voice").unwrap(),
            Command::Mode(InteractionMode::Voice)
        );
        assert_eq!(Command::parse("/MIC").unwrap(), Command::Mic);
        assert_eq!(Command::parse("/quit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_plain_lines_are_messages() {
        assert_eq!(
            Command::parse("  Hello, I'm Dr Patel.").unwrap(),
            Command::Say("  Hello, I'm Dr Patel.".into())
        );
        assert_eq!(Command::parse("").unwrap(), Command::Say(String::new()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Command::parse("/select"),
            Err(CommandError::MissingArgument("select"))
        ));
        assert!(matches!(
            Command::parse("/mode video"),
            Err(CommandError::Mode(_))
        ));
        assert!(matches!(
            Command::parse("/dance"),
            Err(CommandError::Unknown(name)) if name == "dance"
        ));
    }
}
