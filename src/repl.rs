use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::process::{Command as Process, Stdio};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::{error::ReadlineError, DefaultEditor};

use crate::env::{Environment, SourceKind};
use crate::history::CallRecord;
use crate::http::{Headers, HttpMethod};
use crate::session::Session;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Call {
        method: HttpMethod,
        url: String,
        body: String,
    },
    Special(SpecialCommand),
    Empty,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SpecialCommand {
    Help(Option<String>),
    Exit,
    SetHeader(String),
    ShowHeaders,
    ClearHeaders,
    ShowEnv(String),
    SetEnv(Vec<String>),
    Profiles,
    Create(String),
    Use(String),
    Remove(Vec<String>),
    Rename { old: String, new: String },
    History,
    ShowCall(usize),
    Redo(usize),
    LoadBody(String),
    SaveResponse { path: String, append: bool },
    Shell(String),
}

/// Splits off the first whitespace separated word, keeping the rest of the
/// line verbatim.
fn next_word(line: &str) -> (&str, &str) {
    let line = line.trim_start();
    match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim_start()),
        None => (line, ""),
    }
}

fn parse_index(arg: &str, usage: &str) -> Result<usize> {
    arg.parse::<usize>()
        .with_context(|| format!("Usage: {usage}"))
}

fn file_arg(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("Usage: {usage}");
    }
    Ok(shellexpand::tilde(rest).to_string())
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    if let Some(script) = line.strip_prefix('!') {
        let script = script.trim();
        if script.is_empty() {
            bail!("Usage: ! <shell command>");
        }
        return Ok(Command::Special(SpecialCommand::Shell(script.to_string())));
    }

    let (word, rest) = next_word(line);
    if let Ok(method) = word.parse::<HttpMethod>() {
        let (url, body) = next_word(rest);
        if url.is_empty() {
            bail!("Usage: {} <URL> [body]", method);
        }
        return Ok(Command::Call {
            method,
            url: url.to_string(),
            body: body.to_string(),
        });
    }

    let args: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    let special = match word.to_lowercase().as_str() {
        "help" | "h" | "?" | "man" => SpecialCommand::Help(args.first().cloned()),
        "exit" | "quit" | "q" => SpecialCommand::Exit,
        "header" => {
            if rest.is_empty() {
                bail!("Usage: header <KEY>=<VALUE>");
            }
            SpecialCommand::SetHeader(rest.to_string())
        }
        "headers" => SpecialCommand::ShowHeaders,
        "clearheaders" => SpecialCommand::ClearHeaders,
        "env" => {
            if args.iter().any(|a| a.contains('=')) {
                SpecialCommand::SetEnv(args)
            } else {
                SpecialCommand::ShowEnv(args.first().cloned().unwrap_or_default())
            }
        }
        "profiles" => SpecialCommand::Profiles,
        "create" => match args.as_slice() {
            [name] => SpecialCommand::Create(name.clone()),
            _ => bail!("Usage: create <NAME>"),
        },
        "use" => match args.as_slice() {
            [name] => SpecialCommand::Use(name.clone()),
            _ => bail!("Usage: use <NAME>"),
        },
        "remove" => {
            if args.is_empty() {
                bail!("Usage: remove <NAME>...");
            }
            SpecialCommand::Remove(args)
        }
        "rename" => match args.as_slice() {
            [old, new] => SpecialCommand::Rename {
                old: old.clone(),
                new: new.clone(),
            },
            _ => bail!("Usage: rename <OLD> <NEW>"),
        },
        "history" => match args.as_slice() {
            [] => SpecialCommand::History,
            [n] => SpecialCommand::ShowCall(parse_index(n, "history [N]")?),
            _ => bail!("Usage: history [N]"),
        },
        "redo" => match args.as_slice() {
            [n] => SpecialCommand::Redo(parse_index(n, "redo <N>")?),
            _ => bail!("Usage: redo <N>"),
        },
        "<" => SpecialCommand::LoadBody(file_arg(rest, "< <FILE>")?),
        ">" => SpecialCommand::SaveResponse {
            path: file_arg(rest, "> <FILE>")?,
            append: false,
        },
        ">>" => SpecialCommand::SaveResponse {
            path: file_arg(rest, ">> <FILE>")?,
            append: true,
        },
        _ => bail!("Unknown command: {}", word),
    };
    Ok(Command::Special(special))
}

fn format_headers(out: &mut String, headers: &Headers) {
    for (name, values) in headers {
        for value in values {
            out.push_str(&format!("{name}: {value}\n"));
        }
    }
}

fn format_response(record: &CallRecord, verbose: bool) -> String {
    let res = record.response();
    let mut out = format!("{} {}\n", res.status, res.reason());
    if verbose {
        format_headers(&mut out, &res.headers);
    }
    if !res.body.is_empty() {
        out.push_str(&res.body);
        if !res.body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn format_call(record: &CallRecord) -> String {
    let req = record.request();
    let mut out = format!("> {} {}\n", req.method, req.url);
    format_headers(&mut out, &req.headers);
    if !req.body.is_empty() {
        out.push_str(&format!("\n{}\n", req.body));
    }
    out.push('\n');
    out.push_str(&format_response(record, true));
    out
}

/// `SHELL` from the `User` namespace, then from `Var`, then the platform
/// default.
fn shell_argv(env: &Environment) -> Vec<String> {
    for kind in [SourceKind::User, SourceKind::Var] {
        if let Some(shell) = env.source(kind).get("SHELL").filter(|s| !s.is_empty()) {
            return vec![shell.clone(), "-c".to_string()];
        }
    }
    if cfg!(windows) {
        vec!["PowerShell.exe".to_string(), "-Command".to_string()]
    } else {
        vec!["/bin/sh".to_string(), "-c".to_string()]
    }
}

/// Runs `script` through the shell with `input` on stdin and returns stdout
/// followed by stderr. A non-zero exit is reported after the output.
fn run_filter(shell: &[String], script: &str, input: &str) -> Result<String> {
    let (program, shell_args) = shell
        .split_first()
        .ok_or_else(|| anyhow!("no shell configured"))?;
    let mut child = Process::new(program)
        .args(shell_args)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("Failed to open stdin of {program}"))?;
    let input = input.to_string();
    // the child may exit without reading everything
    let writer = thread::spawn(move || {
        let _ = stdin.write_all(input.as_bytes());
    });
    let output = child.wait_with_output()?;
    let _ = writer.join();

    let mut out = String::from_utf8_lossy(&output.stdout).into_owned();
    out.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{}\n", output.status));
    }
    Ok(out)
}

pub struct Repl {
    session: Session,
    verbose: bool,
    /// Body for the next call that has none on its command line.
    pending_body: Option<String>,
    /// Body of the last response, or the output of the last filter.
    response: String,
}

impl Repl {
    pub fn new(session: Session, verbose: bool) -> Self {
        Self {
            session,
            verbose,
            pending_body: None,
            response: String::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn run(&mut self) -> Result<()> {
        let interactive = io::stdin().is_terminal();
        let mut editor = if interactive {
            self.print_welcome();
            Some(DefaultEditor::new().context("Failed to create line editor")?)
        } else {
            None
        };

        loop {
            let line = match editor.as_mut() {
                Some(editor) => {
                    let prompt = format!("{}> ", self.session.current().name())
                        .green()
                        .bold()
                        .to_string();
                    match editor.readline(&prompt) {
                        Ok(line) => {
                            let _ = editor.add_history_entry(line.as_str());
                            line
                        }
                        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                        Err(e) => bail!("Failed to read input: {}", e),
                    }
                }
                None => {
                    let mut line = String::new();
                    match io::stdin().read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => line,
                        Err(e) => bail!("Failed to read input: {}", e),
                    }
                }
            };

            match parse_command(&line) {
                Ok(Command::Empty) => continue,
                Ok(Command::Special(SpecialCommand::Exit)) => break,
                Ok(cmd) => match self.execute(cmd) {
                    Ok(out) => print!("{out}"),
                    Err(e) => eprintln!("{}: {}", "Error".red().bold(), e),
                },
                Err(e) => eprintln!("{}: {}", "Error".red().bold(), e),
            }
        }

        if interactive {
            println!("{}", "Goodbye!".green());
        }
        Ok(())
    }

    /// Runs one command against the session and returns what to print.
    pub fn execute(&mut self, cmd: Command) -> Result<String> {
        match cmd {
            Command::Empty => Ok(String::new()),
            Command::Call { method, url, body } => {
                let inline = !body.is_empty();
                let body = if inline {
                    body
                } else {
                    self.pending_body.clone().unwrap_or_default()
                };
                let header_text = self.session.header_text();
                let record = self
                    .session
                    .call(method.as_str(), &url, &body, &header_text)?;
                if !inline {
                    self.pending_body = None;
                }
                self.response = record.response().body.clone();
                Ok(format_response(&record, self.verbose))
            }
            Command::Special(cmd) => self.handle_special_command(cmd),
        }
    }

    fn handle_special_command(&mut self, cmd: SpecialCommand) -> Result<String> {
        let out = match cmd {
            SpecialCommand::Help(None) => help_text(),
            SpecialCommand::Help(Some(command)) => command_help(&command),
            SpecialCommand::Exit => String::new(),
            SpecialCommand::SetHeader(kv) => {
                self.session.set_header(&kv)?;
                String::new()
            }
            SpecialCommand::ShowHeaders => {
                let text = self.session.header_text();
                if text.is_empty() {
                    "No headers set.\n".to_string()
                } else {
                    text
                }
            }
            SpecialCommand::ClearHeaders => {
                self.session.clear_headers()?;
                String::new()
            }
            SpecialCommand::ShowEnv(namespace) => self.session.dump_env(&namespace),
            SpecialCommand::SetEnv(pairs) => {
                let mut out = String::new();
                for (kv, result) in self.session.set_user_vars(&pairs) {
                    if let Err(e) = result {
                        out.push_str(&format!("Failed to set {kv}: {e}\n"));
                    }
                }
                out
            }
            SpecialCommand::Profiles => {
                let mut out = String::new();
                for summary in self.session.list_profiles() {
                    out.push_str(&summary.name);
                    if summary.current {
                        out.push_str(" <-- Current");
                    }
                    out.push('\n');
                }
                out
            }
            SpecialCommand::Create(name) => {
                self.session.create_profile(&name)?;
                format!("Switched to new profile {name}\n")
            }
            SpecialCommand::Use(name) => {
                self.session.use_profile(&name)?;
                format!("Switched to profile {name}\n")
            }
            SpecialCommand::Remove(names) => {
                let mut out = String::new();
                for (name, result) in self.session.remove_profiles(&names) {
                    match result {
                        Ok(()) => out.push_str(&format!("Successfully removed {name}\n")),
                        Err(e) => out.push_str(&format!("Failed to remove {name}: {e}\n")),
                    }
                }
                out
            }
            SpecialCommand::Rename { old, new } => {
                self.session.rename_profile(&old, &new)?;
                format!("Renamed {old} to {new}\n")
            }
            SpecialCommand::History => {
                if self.session.history_size() == 0 {
                    "No calls yet.\n".to_string()
                } else {
                    self.session.history_report()
                }
            }
            SpecialCommand::ShowCall(index) => format_call(self.session.history_get(index)?),
            SpecialCommand::Redo(index) => format!("{}\n", self.session.replay(index)?),
            SpecialCommand::LoadBody(path) => {
                let body = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {path}"))?;
                let out = format!("Loaded {} bytes from {path} for the next call\n", body.len());
                self.pending_body = Some(body);
                out
            }
            SpecialCommand::SaveResponse { path, append } => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(append)
                    .truncate(!append)
                    .open(&path)
                    .with_context(|| format!("Failed to open {path}"))?;
                file.write_all(self.response.as_bytes())
                    .with_context(|| format!("Failed to write {path}"))?;
                format!("Saved {} bytes to {path}\n", self.response.len())
            }
            SpecialCommand::Shell(script) => {
                let shell = shell_argv(self.session.current().environment());
                let out = run_filter(&shell, &script, &self.response)?;
                self.response = out.clone();
                out
            }
        };
        Ok(out)
    }

    fn print_welcome(&self) {
        println!("{}", "Welcome to callpad!".green().bold());
        println!("Type {} for help, {} to exit.", "help".cyan(), "exit".cyan());
        println!(
            "Enter calls like: {} {}",
            "get".yellow(),
            "https://{{User.HOST}}/api/users".blue()
        );
        println!();
    }
}

fn help_text() -> String {
    let mut out = String::new();
    out.push_str("Calls:\n");
    out.push_str("  get|post|put|delete|head URL [BODY]  Send a request\n");
    out.push_str("  header KEY=VALUE                     Set a header on the request template\n");
    out.push_str("  headers                              Show the template headers\n");
    out.push_str("  clearheaders                         Remove every template header\n");
    out.push_str("  < FILE                               Use FILE as the body of the next call\n");
    out.push_str("\nResponses:\n");
    out.push_str("  > FILE                               Write the last response body to FILE\n");
    out.push_str("  >> FILE                              Append the last response body to FILE\n");
    out.push_str("  ! COMMAND                            Pipe the last response through the shell\n");
    out.push_str("\nVariables ({{Namespace.KEY}} in URL, headers and body):\n");
    out.push_str("  env [NAMESPACE]                      Show Var, Home or User variables\n");
    out.push_str("  env KEY=VALUE...                     Set User variables\n");
    out.push_str("\nProfiles:\n");
    out.push_str("  profiles                             List profiles\n");
    out.push_str("  create NAME                          Create a profile and switch to it\n");
    out.push_str("  use NAME                             Switch profile\n");
    out.push_str("  remove NAME...                       Remove profiles\n");
    out.push_str("  rename OLD NEW                       Rename a profile\n");
    out.push_str("\nHistory (0 is the newest call):\n");
    out.push_str("  history                              List calls\n");
    out.push_str("  history N                            Show call N\n");
    out.push_str("  redo N                               Print the command that repeats call N\n");
    out.push_str("\n  help [COMMAND]                       Show this help, or help for one command\n");
    out.push_str("  exit                                 Leave callpad\n");
    out
}

/// (names, synopsis, description)
const COMMAND_HELP: &[(&[&str], &str, &str)] = &[
    (
        &["get", "post", "put", "delete", "head"],
        "get|post|put|delete|head URL [BODY]",
        "Sends a request built from the URL, the template headers and BODY. \
         Without BODY the file loaded with '<' is sent, if any. Tokens such as \
         {{User.KEY}} are resolved right before sending and unknown ones are \
         sent as written.",
    ),
    (
        &["header"],
        "header KEY=VALUE",
        "Replaces every value of header KEY on the request template.",
    ),
    (&["headers"], "headers", "Shows the template headers."),
    (
        &["clearheaders"],
        "clearheaders",
        "Removes every header from the request template.",
    ),
    (
        &["env"],
        "env [NAMESPACE]\n  env KEY=VALUE...",
        "Shows the variables of one namespace (Var, Home or User), or of all of \
         them. With KEY=VALUE pairs, sets User variables; each failing pair is \
         reported.",
    ),
    (&["profiles"], "profiles", "Lists profiles; the current one is marked."),
    (
        &["create"],
        "create NAME",
        "Creates an empty profile and switches to it. Names are lower case \
         letters and digits.",
    ),
    (&["use"], "use NAME", "Switches to profile NAME."),
    (
        &["remove"],
        "remove NAME...",
        "Removes each named profile. Removing the last profile leaves a fresh \
         'default' profile.",
    ),
    (&["rename"], "rename OLD NEW", "Renames a profile."),
    (
        &["history"],
        "history [N]",
        "Lists past calls, newest first, or shows call N in full.",
    ),
    (
        &["redo"],
        "redo N",
        "Prints the command line that repeats call N.",
    ),
    (
        &["<"],
        "< FILE",
        "Reads FILE and sends it as the body of the next call without an inline body.",
    ),
    (
        &[">", ">>"],
        "> FILE\n  >> FILE",
        "Writes the last response body to FILE, replacing it with '>' or \
         appending with '>>'.",
    ),
    (
        &["!"],
        "! COMMAND",
        "Runs COMMAND through the shell named by User.SHELL or Var.SHELL, \
         falling back to /bin/sh, with the last response body on stdin. The \
         output replaces the response, so it can be saved with '>'.",
    ),
    (&["help", "man", "?"], "help [COMMAND]", "Shows help."),
    (&["exit", "quit", "q"], "exit", "Leaves callpad."),
];

fn command_help(command: &str) -> String {
    let command = command.to_lowercase();
    match COMMAND_HELP
        .iter()
        .find(|(names, _, _)| names.contains(&command.as_str()))
    {
        Some((_, synopsis, description)) => {
            format!("SYNOPSIS\n\n  {synopsis}\n\nDESCRIPTION\n\n  {description}\n")
        }
        None => format!("No documentation for '{command}'\n"),
    }
}
