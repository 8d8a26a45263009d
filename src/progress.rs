/*!
 * Terminal rendering of the `MakeCluster` response stream
 *
 * Progress ticks accumulate into one bar per label, log messages print above
 * the bars and raw command output is printed verbatim.
 */

use gpctl_proto::{make_cluster_reply::Message, LogLevel, LogMessage, MakeClusterReply};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;

pub struct ProgressRenderer {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    verbose: bool,
    lines: Vec<String>,
}

impl ProgressRenderer {
    pub fn new(verbose: bool) -> Self {
        Self::with_target(ProgressDrawTarget::stderr(), verbose)
    }

    /// A renderer that draws nothing, for tests and non-interactive use.
    pub fn hidden(verbose: bool) -> Self {
        Self::with_target(ProgressDrawTarget::hidden(), verbose)
    }

    fn with_target(target: ProgressDrawTarget, verbose: bool) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            verbose,
            lines: Vec::new(),
        }
    }

    pub fn handle(&mut self, reply: MakeClusterReply) {
        match reply.message {
            Some(Message::LogMsg(log)) => self.log(log),
            Some(Message::Progress(progress)) => {
                self.tick(&progress.label, progress.total.max(0) as u64)
            }
            Some(Message::Stdout(line)) => self.print(line),
            None => {}
        }
    }

    fn log(&mut self, log: LogMessage) {
        let prefix = match log.level() {
            LogLevel::Debug if !self.verbose => return,
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Info => "[INFO]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Error => "[ERROR]",
        };
        self.print(format!("{} {}", prefix, log.message));
    }

    fn tick(&mut self, label: &str, total: u64) {
        let multi = &self.multi;
        let bar = self.bars.entry(label.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(total));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message(label.to_string());
            bar
        });

        bar.inc(1);
        if bar.position() >= total {
            bar.finish();
        }
    }

    fn print(&mut self, line: String) {
        if self.multi.println(&line).is_err() {
            eprintln!("{}", line);
        }
        self.lines.push(line);
    }

    /// Current position and length of the bar for `label`.
    pub fn bar(&self, label: &str) -> Option<(u64, u64)> {
        self.bars
            .get(label)
            .map(|bar| (bar.position(), bar.length().unwrap_or(0)))
    }

    pub fn is_finished(&self, label: &str) -> bool {
        self.bars.get(label).is_some_and(ProgressBar::is_finished)
    }

    /// Every line printed so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
