use crate::api::ApiClient;
use crate::config::{resolve_tunables, Config};
use crate::state::{
    EditSession, EpochCounter, GenerationState, GenerationUpdate, HistoryStatus,
    ResponseAggregator, SessionMode,
};
use crate::util::{parse_bool_flag, truncate_preview};
use anyhow::Result;
use std::io::Write as _;
use std::time::Instant;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

const HISTORY_PREVIEW_CHARS: usize = 48;

/// Line-oriented driver around the edit session: plain lines extend the
/// document, `:`-commands drive history and generation. Kept deliberately
/// thin; the session and buffer own all the behavior.
pub struct App {
    client: ApiClient,
    session: EditSession,
    epochs: EpochCounter,
    update_tx: mpsc::UnboundedSender<GenerationUpdate>,
    update_rx: mpsc::UnboundedReceiver<GenerationUpdate>,
    status_rx: mpsc::UnboundedReceiver<HistoryStatus>,
    status_notices: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let tunables = resolve_tunables();
        let client = ApiClient::new(&config);
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();

        let mut session = EditSession::new("", tunables);
        session.buffer_mut().set_status_notifier(status_tx);

        Ok(Self {
            client,
            session,
            epochs: EpochCounter::new(),
            update_tx,
            update_rx,
            status_rx,
            status_notices: status_notices_enabled(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("inkdraft: type to extend the document, :help for commands");
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

        loop {
            let deadline = self.session.next_deadline();
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if self.handle_line(line.trim_end()) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Some(update) = self.update_rx.recv() => self.apply_update(update),
                Some(status) = self.status_rx.recv() => {
                    if self.status_notices {
                        println!("[history] undo:{} redo:{}", status.can_undo, status.can_redo);
                    }
                }
                () = wait_for_deadline(deadline) => self.session.tick(Instant::now()),
            }
        }

        Ok(())
    }

    /// Returns true when the app should exit.
    fn handle_line(&mut self, line: &str) -> bool {
        match line {
            "" => {}
            ":quit" | ":q" => return true,
            ":help" => print_help(),
            ":show" => {
                let mode = match self.session.mode() {
                    SessionMode::Editing => "editing",
                    SessionMode::Previewing => "previewing",
                };
                println!("--- [{mode}] ---\n{}\n---", self.session.rendered());
            }
            ":undo" => {
                if !self.session.buffer_mut().undo() {
                    println!("[nothing to undo]");
                }
            }
            ":redo" => {
                if !self.session.buffer_mut().redo() {
                    println!("[nothing to redo]");
                }
            }
            ":history" => self.print_history(),
            ":preview" => self.session.preview_now(),
            ":edit" => self.session.begin_editing(),
            ":reset" => self.session.reset(""),
            _ => {
                if let Some(index) = line.strip_prefix(":restore ") {
                    self.restore(index);
                } else if let Some(text) = line.strip_prefix(":paste ") {
                    self.session.paste(text);
                } else if let Some(prompt) = line.strip_prefix(":ai ") {
                    self.start_generation(prompt);
                } else if line.starts_with(':') {
                    println!("[unknown command: {line}]");
                } else {
                    self.append_line(line);
                }
            }
        }
        false
    }

    fn append_line(&mut self, line: &str) {
        self.session.begin_editing();
        let current = self.session.rendered();
        let next = if current.is_empty() {
            line.to_string()
        } else {
            format!("{current}\n{line}")
        };
        self.session.edit(next);
    }

    fn restore(&mut self, index: &str) {
        let Ok(index) = index.trim().parse::<usize>() else {
            println!("[restore expects a history index]");
            return;
        };
        match self.session.buffer_mut().restore(index) {
            Ok(()) => println!("[restored version {index}]"),
            Err(error) => println!("[{error}]"),
        }
    }

    fn print_history(&self) {
        let cursor = self.session.buffer().cursor();
        for (index, snapshot) in self.session.buffer().history().iter().enumerate() {
            let marker = if index == cursor { '>' } else { ' ' };
            println!(
                "{marker} {index:>3}  {}",
                truncate_preview(&snapshot.value, HISTORY_PREVIEW_CHARS)
            );
        }
    }

    /// Spawns one generation request. Starting a new one supersedes any
    /// request still in flight via the epoch counter; no teardown needed.
    fn start_generation(&mut self, prompt: &str) {
        let aggregator = ResponseAggregator::start(&self.epochs);
        let client = self.client.clone();
        let update_tx = self.update_tx.clone();
        let prompt = prompt.to_string();
        let context = self.session.rendered().to_string();

        tokio::spawn(async move {
            match client.create_stream(&prompt, &context).await {
                Ok(stream) => {
                    aggregator.consume(stream, Some(&update_tx)).await;
                }
                Err(error) => {
                    aggregator.fail(error.to_string(), Some(&update_tx));
                }
            }
        });
    }

    fn apply_update(&mut self, update: GenerationUpdate) {
        match update {
            GenerationUpdate::Delta { epoch, text } => {
                if !self.epochs.is_latest(epoch) {
                    return;
                }
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            GenerationUpdate::Finished { handle } => {
                if !self.epochs.is_latest(handle.epoch) {
                    return;
                }
                match handle.state {
                    GenerationState::Done => {
                        self.session
                            .insert_generated(&handle.accumulated, Instant::now());
                        println!("\n[response inserted]");
                    }
                    GenerationState::Errored => {
                        println!("\n[generation failed] {}", handle.accumulated);
                    }
                    GenerationState::Active | GenerationState::Cancelled => {}
                }
            }
        }
    }
}

fn status_notices_enabled() -> bool {
    std::env::var("INK_STATUS_NOTICES")
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(true)
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(due) => tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await,
        None => std::future::pending().await,
    }
}

fn print_help() {
    println!(
        "commands:\n  \
         <text>        extend the document with a line\n  \
         :paste <text> paste (large pastes jump to preview)\n  \
         :ai <prompt>  stream a generation into the document\n  \
         :undo / :redo move through history\n  \
         :history      list versions (> marks current)\n  \
         :restore <n>  jump to version n\n  \
         :preview      render the committed document\n  \
         :edit         back to editing\n  \
         :show         print the current surface\n  \
         :reset        discard document and history\n  \
         :quit         exit"
    );
}
