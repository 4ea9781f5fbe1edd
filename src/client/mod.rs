//! Client - line-oriented front ends for the three channels
//!
//! Every front end runs the same loop: stdin lines become intents for the
//! spawned session, and each published view is diffed against what was
//! already printed. Channel output goes to stdout, notices to stderr.

mod commands;
mod input;
mod renderer;

pub use commands::CommandResult;
pub use input::{parse_input, parse_pairs, ParsedInput};

use crate::channel::{
    ChannelKind, ConfigDialog, ConsoleIntent, ExportConfig, ExportIntent, ExportSession,
    GmChannel, GmIntent, TargetMultiplexer, ValidationError,
};
use crate::config::Config;
use crate::session::{self, ChannelHandler, Session, SessionView};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tokio::io::{AsyncBufReadExt, BufReader};

type Intent<F> = <<F as Frontend>::Channel as ChannelHandler>::Intent;

/// One channel's REPL behaviour
trait Frontend {
    type Channel: ChannelHandler + Clone + Send + Sync + 'static;

    /// Translate one input line given the latest channel snapshot
    fn on_line(&mut self, line: &str, channel: &Self::Channel) -> CommandResult<Intent<Self>>;

    /// Print what changed since the last view; may ask for follow-up intents
    fn on_view(&mut self, view: &SessionView<Self::Channel>) -> Vec<Intent<Self>>;
}

fn session_for<H: ChannelHandler>(config: &Config, handler: H) -> Session<H> {
    Session::new(
        handler,
        config.endpoint_url(H::KIND),
        config.policy_for(H::KIND),
    )
}

/// Run the console REPL, optionally focusing `target` once it is listed
pub async fn run_console(config: &Config, target: Option<String>) -> Result<()> {
    let frontend = ConsoleFrontend::new(config.console.show_timestamps, target);
    println!("Console on {} (:help for commands)", config.endpoint_url(ChannelKind::Console));
    run(frontend, session_for(config, TargetMultiplexer::new())).await
}

/// Run the GM REPL
pub async fn run_gm(config: &Config) -> Result<()> {
    println!("GM tools on {} (:help for commands)", config.endpoint_url(ChannelKind::Gm));
    run(GmFrontend::default(), session_for(config, GmChannel::new())).await
}

/// Run the export REPL
pub async fn run_export(config: &Config) -> Result<()> {
    let frontend = ExportFrontend::new(config.console.show_timestamps);
    println!("Table export on {} (:help for commands)", config.endpoint_url(ChannelKind::Export));
    run(frontend, session_for(config, ExportSession::new())).await
}

async fn run<F>(mut frontend: F, session: Session<F::Channel>) -> Result<()>
where
    F: Frontend,
    Intent<F>: Send + 'static,
{
    let mut handle = session::spawn(session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                let channel = handle.view().channel.clone();
                match frontend.on_line(&line, &channel) {
                    CommandResult::Continue => {}
                    CommandResult::Print(text) | CommandResult::Confirm(text) => println!("{}", text),
                    CommandResult::Apply(intents) => {
                        for intent in intents {
                            handle.apply(intent)?;
                        }
                    }
                    CommandResult::Exit => break,
                }
            }
            changed = handle.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = handle.view().clone();
                for intent in frontend.on_view(&view) {
                    handle.apply(intent)?;
                }
                while let Some(notice) = handle.try_notice() {
                    eprintln!("{}", renderer::format_notice(&notice));
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

struct ConsoleFrontend {
    show_timestamps: bool,
    printed: u64,
    wanted_target: Option<String>,
    confirming: bool,
    targets: Vec<String>,
    active: Option<String>,
}

impl ConsoleFrontend {
    fn new(show_timestamps: bool, wanted_target: Option<String>) -> Self {
        Self {
            show_timestamps,
            printed: 0,
            wanted_target,
            confirming: false,
            targets: Vec::new(),
            active: None,
        }
    }
}

impl Frontend for ConsoleFrontend {
    type Channel = TargetMultiplexer;

    fn on_line(&mut self, line: &str, mux: &TargetMultiplexer) -> CommandResult<ConsoleIntent> {
        if self.confirming {
            self.confirming = false;
            let yes = matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes");
            let intent = if yes {
                ConsoleIntent::ConfirmReload
            } else {
                ConsoleIntent::CancelReload
            };
            return CommandResult::Apply(vec![intent]);
        }
        if line.trim().is_empty() {
            return CommandResult::Continue;
        }

        match parse_input(line) {
            Err(e) => CommandResult::Print(e.to_string()),
            Ok(ParsedInput::Text(text)) => CommandResult::Apply(vec![ConsoleIntent::Submit(text)]),
            Ok(ParsedInput::SwitchTarget(target)) => {
                CommandResult::Apply(vec![ConsoleIntent::Select(target)])
            }
            Ok(ParsedInput::SendToTarget { target, command }) => {
                if !mux.has_target(&target) {
                    return CommandResult::Print(ValidationError::UnknownTarget(target).to_string());
                }
                CommandResult::Apply(vec![
                    ConsoleIntent::Select(target),
                    ConsoleIntent::Submit(command),
                ])
            }
            Ok(ParsedInput::ControlCommand { command, args }) => {
                match commands::console_command(&command, &args, mux) {
                    CommandResult::Confirm(prompt) => {
                        self.confirming = true;
                        println!("{}", prompt);
                        CommandResult::Apply(vec![ConsoleIntent::RequestReload])
                    }
                    other => other,
                }
            }
        }
    }

    fn on_view(&mut self, view: &SessionView<TargetMultiplexer>) -> Vec<ConsoleIntent> {
        let mux = &view.channel;
        let mut follow_up = Vec::new();

        let names: Vec<String> = mux.targets().iter().map(|t| t.name.clone()).collect();
        if names != self.targets {
            if names.is_empty() {
                println!("targets: none");
            } else {
                println!("targets: {}", names.join(", "));
            }
            self.targets = names;

            if let Some(wanted) = self.wanted_target.take() {
                if mux.has_target(&wanted) {
                    follow_up.push(ConsoleIntent::Select(wanted));
                } else {
                    eprintln!("{}", ValidationError::UnknownTarget(wanted));
                }
            }
        }

        let active = mux.active().map(str::to_string);
        if active != self.active {
            match &active {
                Some(name) => println!("active target: {}", name),
                None => println!("no active target"),
            }
            self.active = active;
            // Replay the newly focused target's history
            self.printed = 0;
        }

        for entry in mux.log().since(self.printed) {
            println!("{}", renderer::format_entry(entry, self.show_timestamps));
        }
        self.printed = mux.log().last_seq();
        follow_up
    }
}

#[derive(Default)]
struct GmFrontend {
    commands: Option<usize>,
    selected: Option<String>,
    awaiting: BTreeSet<String>,
}

impl Frontend for GmFrontend {
    type Channel = GmChannel;

    fn on_line(&mut self, line: &str, gm: &GmChannel) -> CommandResult<GmIntent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return CommandResult::Continue;
        }
        if trimmed.starts_with(':') {
            return match parse_input(trimmed) {
                Ok(ParsedInput::ControlCommand { command, args }) => {
                    commands::gm_command(&command, &args, gm)
                }
                Ok(_) => CommandResult::Continue,
                Err(e) => CommandResult::Print(e.to_string()),
            };
        }
        match commands::gm_invocation(trimmed, gm) {
            Ok(intent) => {
                if let GmIntent::Invoke { command, .. } = &intent {
                    self.awaiting.insert(command.clone());
                }
                CommandResult::Apply(vec![intent])
            }
            Err(e) => CommandResult::Print(e.to_string()),
        }
    }

    fn on_view(&mut self, view: &SessionView<GmChannel>) -> Vec<GmIntent> {
        let gm = &view.channel;

        let count = gm.catalog().len();
        if self.commands != Some(count) && (self.commands.is_some() || count > 0) {
            println!("{} GM command(s) available", count);
            self.commands = Some(count);
        }

        let selected = gm.selected().map(|c| c.label.clone());
        if selected != self.selected {
            if let Some(cmd) = gm.selected() {
                println!("{}", renderer::format_command(cmd, gm.invoker().slot(&cmd.id)));
            }
            self.selected = selected;
        }

        let ready: Vec<String> = self
            .awaiting
            .iter()
            .filter(|id| gm.invoker().response(id).is_some())
            .cloned()
            .collect();
        for id in ready {
            if let Some(data) = gm.invoker().response(&id) {
                println!("{} -> {}", id, renderer::format_response(data));
            }
            self.awaiting.remove(&id);
        }
        Vec::new()
    }
}

struct ExportFrontend {
    show_timestamps: bool,
    printed: u64,
    dialog: ConfigDialog,
    config: Option<ExportConfig>,
    running: bool,
}

impl ExportFrontend {
    fn new(show_timestamps: bool) -> Self {
        Self {
            show_timestamps,
            printed: 0,
            dialog: ConfigDialog::Closed,
            config: None,
            running: false,
        }
    }
}

impl Frontend for ExportFrontend {
    type Channel = ExportSession;

    fn on_line(&mut self, line: &str, export: &ExportSession) -> CommandResult<ExportIntent> {
        if line.trim().is_empty() {
            return CommandResult::Continue;
        }
        match parse_input(line) {
            Ok(ParsedInput::ControlCommand { command, args }) => {
                commands::export_command(&command, &args, export)
            }
            Ok(_) => CommandResult::Print("Commands start with ':' (try :help)".to_string()),
            Err(e) => CommandResult::Print(e.to_string()),
        }
    }

    fn on_view(&mut self, view: &SessionView<ExportSession>) -> Vec<ExportIntent> {
        let export = &view.channel;
        let mut follow_up = Vec::new();

        for entry in export.log().since(self.printed) {
            println!("{}", renderer::format_entry(entry, self.show_timestamps));
        }
        self.printed = export.log().last_seq();

        if self.running && !export.is_running() {
            println!("export finished");
        }
        self.running = export.is_running();

        let config = export.config().cloned();
        let opened = export.dialog() == ConfigDialog::Open && self.dialog != ConfigDialog::Open;
        let reloaded = export.dialog() == ConfigDialog::Open && config != self.config;
        if opened || reloaded {
            println!("{}", renderer::format_config(config.as_ref()));
        }
        if self.dialog == ConfigDialog::Saving && export.dialog() == ConfigDialog::Closed {
            println!("settings saved");
        }
        self.dialog = export.dialog();
        self.config = config;

        if let Some(info) = export.sheet_info() {
            println!("{}", info);
            follow_up.push(ExportIntent::DismissSheetInfo);
        }
        follow_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mux() -> TargetMultiplexer {
        let mut mux = TargetMultiplexer::new();
        mux.ingest_servers(vec!["a".into(), "b".into()]);
        mux
    }

    #[test]
    fn test_console_send_to_target_switches_first() {
        let mut frontend = ConsoleFrontend::new(false, None);
        assert_eq!(
            frontend.on_line("@b: print(1)", &mux()),
            CommandResult::Apply(vec![
                ConsoleIntent::Select("b".into()),
                ConsoleIntent::Submit("print(1)".into())
            ])
        );
        assert!(matches!(
            frontend.on_line("@zzz: print(1)", &mux()),
            CommandResult::Print(_)
        ));
    }

    #[test]
    fn test_console_reload_confirmation() {
        let mut frontend = ConsoleFrontend::new(false, None);
        assert_eq!(
            frontend.on_line(":reload", &mux()),
            CommandResult::Apply(vec![ConsoleIntent::RequestReload])
        );
        assert_eq!(
            frontend.on_line("y", &mux()),
            CommandResult::Apply(vec![ConsoleIntent::ConfirmReload])
        );

        frontend.on_line(":reload", &mux());
        assert_eq!(
            frontend.on_line("", &mux()),
            CommandResult::Apply(vec![ConsoleIntent::CancelReload])
        );
    }

    #[test]
    fn test_console_wanted_target_selected_once_listed() {
        let mut frontend = ConsoleFrontend::new(false, Some("b".into()));
        let view = SessionView {
            state: crate::transport::ConnectionState::Connected,
            channel: mux(),
        };
        assert_eq!(frontend.on_view(&view), vec![ConsoleIntent::Select("b".into())]);
        assert!(frontend.on_view(&view).is_empty());
    }

    #[test]
    fn test_console_switch_replays_target_log() {
        let mut channel = mux();
        channel.submit("one".into()).unwrap();
        channel.submit("two".into()).unwrap();
        let mut frontend = ConsoleFrontend::new(false, None);
        let mut view = SessionView {
            state: crate::transport::ConnectionState::Connected,
            channel,
        };
        frontend.on_view(&view);
        assert_eq!(frontend.printed, 2);

        view.channel.select("b").unwrap();
        frontend.on_view(&view);
        assert_eq!(frontend.active.as_deref(), Some("b"));
        assert_eq!(frontend.printed, 0);

        view.channel.select("a").unwrap();
        frontend.on_view(&view);
        assert_eq!(frontend.printed, 2);
    }

    #[test]
    fn test_export_sheet_info_is_dismissed_after_printing() {
        let mut export = ExportSession::new();
        export.handle(crate::channel::ExportInbound::SheetInfo("item.xlsx".into()));
        let mut frontend = ExportFrontend::new(false);
        let view = SessionView {
            state: crate::transport::ConnectionState::Connected,
            channel: export,
        };
        assert_eq!(frontend.on_view(&view), vec![ExportIntent::DismissSheetInfo]);
    }
}
