//! Interactive command shell.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use daybook_core::api::{DayEntriesOptions, JournalDraft};
use daybook_core::{ApiError, AuthError, Config, DaybookClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub const HELP: &str = "\
Commands:
  login [username]          Sign in (prompts for password)
  register [username]       Create an account and sign in
  day [YYYY-MM-DD] [limit]  List journal entries for a day (default today)
  save [--id ID] <title> [| content]
                            Create an entry, or update entry ID
  delete <id>               Delete an entry
  status                    Show session state
  logout                    Sign out
  help                      Show this help
  quit                      Exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(Option<String>),
    Register(Option<String>),
    Day { date: Option<NaiveDate>, limit: Option<usize> },
    Save { id: Option<String>, title: String, content: String },
    Delete(String),
    Status,
    Logout,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(Command::Empty);
        };
        let args: Vec<&str> = parts.collect();
        let rest = line.trim_start()[name.len()..].trim();

        let command = match name {
            "login" => Command::Login(args.first().map(|s| s.to_string())),
            "register" => Command::Register(args.first().map(|s| s.to_string())),
            "day" => {
                let date = args
                    .first()
                    .map(|s| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .map_err(|_| format!("Invalid date '{}', expected YYYY-MM-DD", s))
                    })
                    .transpose()?;
                let limit = args
                    .get(1)
                    .map(|s| s.parse::<usize>().map_err(|_| format!("Invalid limit '{}'", s)))
                    .transpose()?;
                Command::Day { date, limit }
            }
            "save" => Self::parse_save(rest)?,
            "delete" => match args.as_slice() {
                [id] => Command::Delete(id.to_string()),
                _ => return Err("Usage: delete <id>".to_string()),
            },
            "status" => Command::Status,
            "logout" => Command::Logout,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("Unknown command '{}', try 'help'", other)),
        };
        Ok(command)
    }

    /// `[--id ID] <title> [| content]`
    fn parse_save(rest: &str) -> Result<Self, String> {
        const USAGE: &str = "Usage: save [--id ID] <title> [| content]";

        let (id, rest) = match rest.strip_prefix("--id") {
            Some(after) => {
                let after = after.trim_start();
                let (id, remainder) = after.split_once(char::is_whitespace).unwrap_or((after, ""));
                if id.is_empty() {
                    return Err(USAGE.to_string());
                }
                (Some(id.to_string()), remainder.trim())
            }
            None => (None, rest),
        };

        let (title, content) = rest.split_once('|').unwrap_or((rest, ""));
        let title = title.trim();
        if title.is_empty() {
            return Err(USAGE.to_string());
        }
        Ok(Command::Save {
            id,
            title: title.to_string(),
            content: content.trim().to_string(),
        })
    }
}

pub struct Shell {
    client: DaybookClient,
    config: Config,
}

impl Shell {
    pub fn new(client: DaybookClient, config: Config) -> Self {
        Self { client, config }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            Self::prompt(self.client.session.is_authenticated())?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match Command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await?,
                Err(message) => println!("{}", message),
            }
        }
        Ok(())
    }

    fn prompt(authenticated: bool) -> Result<()> {
        use std::io::Write;
        print!("{} ", if authenticated { "daybook>" } else { "daybook (signed out)>" });
        std::io::stdout().flush()?;
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login(username) => self.login(username, false).await?,
            Command::Register(username) => self.login(username, true).await?,
            Command::Day { date, limit } => self.day(date, limit).await,
            Command::Save { id, title, content } => self.save(id, &title, content).await,
            Command::Delete(id) => self.delete(&id).await,
            Command::Status => self.status(),
            Command::Logout => {
                self.client.session.logout().await;
                println!("Signed out.");
            }
            Command::Help => println!("{}", HELP),
            Command::Quit | Command::Empty => {}
        }
        Ok(())
    }

    async fn login(&mut self, username: Option<String>, register: bool) -> Result<()> {
        let Some(username) = username.or_else(|| self.config.last_username.clone()) else {
            println!("Usage: {} <username>", if register { "register" } else { "login" });
            return Ok(());
        };

        let password = rpassword::prompt_password("Password: ")?;
        if register {
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != confirm {
                println!("Passwords do not match");
                return Ok(());
            }
        }

        let session = &self.client.session;
        let result = if register {
            session.register(&username, &password).await
        } else {
            session.login(&username, &password).await
        };

        match result {
            Ok(_) => {
                println!("Signed in as {}.", username);
                if let Err(e) = Config::remember_username(&username) {
                    warn!(error = %e, "Failed to save config");
                }
                self.config.last_username = Some(username);
            }
            Err(AuthError::UserNotFound) => {
                println!("We can't find this user. You can create an account with 'register {}'.", username);
            }
            Err(AuthError::AccountExists) => println!("User already exists. Please log in."),
            Err(e) => println!("{}", e),
        }
        Ok(())
    }

    async fn day(&self, date: Option<NaiveDate>, limit: Option<usize>) {
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let options = DayEntriesOptions {
            limit,
            tz: Some(self.config.timezone.clone()),
            cancel: None,
        };

        match self.client.journals.day_entries(date, options).await {
            Ok(entries) if entries.items.is_empty() => println!("No journals found for {}.", date),
            Ok(entries) => {
                for journal in &entries.items {
                    let tags = if journal.tags.is_empty() {
                        String::new()
                    } else {
                        format!("  [{}]", journal.tags.join(", "))
                    };
                    println!("- {}{}", journal.title_display(), tags);
                }
                if entries.has_more {
                    println!("  ... more entries, run 'day {}' without a limit", date);
                }
            }
            Err(e) => Self::report(e),
        }
    }

    async fn save(&self, id: Option<String>, title: &str, content: String) {
        let draft = JournalDraft::new(title, content);
        let result = match id {
            Some(ref id) => self.client.journals.update(id, &draft).await,
            None => self.client.journals.create(&draft).await,
        };
        match result {
            Ok(journal) => println!(
                "Saved '{}' ({}).",
                journal.title_display(),
                journal.id.as_deref().or(id.as_deref()).unwrap_or("no id")
            ),
            Err(e) => Self::report(e),
        }
    }

    async fn delete(&self, id: &str) {
        match self.client.journals.delete(id).await {
            Ok(()) => println!("Deleted {}.", id),
            Err(e) => Self::report(e),
        }
    }

    fn report(error: ApiError) {
        match error {
            ApiError::NotAuthenticated | ApiError::RefreshFailed(_) => {
                println!("Your session has ended. Please log in.");
            }
            e => println!("Error: {}", e),
        }
    }

    fn status(&self) {
        let session = &self.client.session;
        match session.credential_store().get() {
            Some(credential) => {
                let expiry = if credential.is_expired() {
                    "expired, renews on next request".to_string()
                } else {
                    credential
                        .time_until_expiry()
                        .map(|left| format!("expires in {}m", left.num_minutes()))
                        .unwrap_or_else(|| "expiry unknown".to_string())
                };
                let refresh = if session.has_refresh_timer() {
                    "refresh scheduled"
                } else {
                    "no refresh scheduled"
                };
                println!("Signed in ({}, {}).", expiry, refresh);
            }
            None => println!("Signed out."),
        }
        info!(ready = session.is_ready(), "Status requested");
    }
}
