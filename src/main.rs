// Copyright 2023 Meta Platforms, Inc. and affiliates.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use edk2_form_console::hii::extract;
use edk2_form_console::hii::model::FormSet;
use edk2_form_console::hii::model::StatementKind;
use edk2_form_console::hii::package;
use edk2_form_console::hii::parser::parse_form_set;
use edk2_form_console::terminal::device::TerminalDevice;
use edk2_form_console::terminal::fsm::TerminalType;
use log::info;

const MAX_ALLOWED_FILESIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Parser)]
#[clap(
    name = "fwconsole",
    about = "EDK-II terminal console and IFR form engine inspection tool",
    long_about = None
)]
struct FwConsoleArgs {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drive the terminal console byte/key pipeline
    Terminal(TerminalCommand),
    /// Inspect a dumped HII database's IFR form packages
    Ifr(IfrCommand),
}

#[derive(Debug, Parser)]
struct TerminalCommand {
    #[clap(subcommand)]
    command: TerminalSubcommands,
}

#[derive(Debug, Subcommand)]
enum TerminalSubcommands {
    /// Feed a file of raw serial bytes through the codec/FSM and print the decoded keys
    Feed {
        #[clap(value_parser)]
        filename: PathBuf,
        #[clap(short = 't', long = "terminal-type", default_value = "vt100")]
        terminal_type: String,
        #[clap(short = 'j', long = "json", action, value_parser)]
        json: bool,
    },
    /// Run a string through the outbound sequencer and print the emitted bytes
    Write {
        #[clap(value_parser)]
        text: String,
        #[clap(short = 't', long = "terminal-type", default_value = "vt100")]
        terminal_type: String,
    },
}

#[derive(Debug, Parser)]
struct IfrCommand {
    #[clap(subcommand)]
    command: IfrSubcommands,
}

#[derive(Debug, Subcommand)]
enum IfrSubcommands {
    /// Dump the HII database from firmware into a file
    ExtractDB {
        #[clap(value_parser)]
        filename: PathBuf,
    },
    /// List all string-id, string pairs found in the database
    ListStrings {
        /// If unset this tool will try to automatically extract the HiiDB
        #[clap(short, long)]
        filename: Option<PathBuf>,
        #[clap(short = 'j', long = "json", action, value_parser)]
        json: bool,
    },
    /// List questions found in the first form package of the database
    ListQuestions {
        #[clap(short, long)]
        filename: Option<PathBuf>,
        #[clap(short = 'j', long = "json", action, value_parser)]
        json: bool,
    },
    /// Show a human readable dump of the first parsed form-set
    ShowIFR {
        #[clap(short, long)]
        filename: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = FwConsoleArgs::parse();

    if let Err(why) = handle_cmds(args) {
        eprintln!("error: {:#}", why);
        process::exit(1);
    }

    info!("done");
    Ok(())
}

fn handle_cmds(args: FwConsoleArgs) -> Result<()> {
    match &args.command {
        Commands::Terminal(terminal_command) => match &terminal_command.command {
            TerminalSubcommands::Feed {
                filename,
                terminal_type,
                json,
            } => {
                let bytes = read_file_bytes(filename)?;
                let terminal_type = parse_terminal_type(terminal_type)?;
                let mut device = TerminalDevice::new(terminal_type, 80, 25);
                device.start();
                device.feed_bytes(&bytes, 0)?;

                let mut keys = Vec::new();
                while let Some(key) = device.read_key() {
                    keys.push(key);
                }

                if *json {
                    let rows: Vec<_> = keys
                        .iter()
                        .map(|k| {
                            serde_json::json!({
                                "scan": format!("{:?}", k.scan),
                                "unicode_char": k.unicode_char,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    for key in &keys {
                        println!("{:?}", key);
                    }
                }
            }
            TerminalSubcommands::Write {
                text,
                terminal_type,
            } => {
                let terminal_type = parse_terminal_type(terminal_type)?;
                let mut device = TerminalDevice::new(terminal_type, 80, 25);
                device.start();
                let code_units: Vec<u16> = text.encode_utf16().collect();
                let bytes = device.write_string(&code_units)?;
                println!("{}", hex_dump(&bytes));
            }
        },
        Commands::Ifr(ifr_command) => match &ifr_command.command {
            IfrSubcommands::ExtractDB { filename } => {
                let mut file = File::create(filename)
                    .context(format!("creating {}", filename.display()))?;
                let db = extract::extract_db()?;
                file.write_all(&db)?;
                println!("HiiDB written to {}", filename.display());
            }
            IfrSubcommands::ListStrings { filename, json } => {
                let db = package::read_db(&get_db_dump_bytes(filename.as_deref())?)?;
                let mut rows = Vec::new();
                for (package_list_guid, maps) in &db.strings {
                    for (package_index, map) in maps.iter().enumerate() {
                        for (string_id, text) in map {
                            rows.push((package_list_guid.clone(), package_index, *string_id, text.clone()));
                        }
                    }
                }
                rows.sort();
                if *json {
                    let rows: Vec<_> = rows
                        .iter()
                        .map(|(guid, package_index, string_id, text)| {
                            serde_json::json!({
                                "package_list_guid": guid,
                                "package_index": package_index,
                                "string_id": string_id,
                                "text": text,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    for (guid, package_index, string_id, text) in &rows {
                        println!("{} [{}] #{}: {}", guid, package_index, string_id, text);
                    }
                }
            }
            IfrSubcommands::ListQuestions { filename, json } => {
                let (formset, strings) = first_formset(filename.as_deref())?;
                let mut rows = Vec::new();
                for statement in &formset.statements {
                    let Some(header) = statement.question_header() else {
                        continue;
                    };
                    rows.push(serde_json::json!({
                        "question_id": header.question_id,
                        "var_store_id": header.var_store_id,
                        "prompt": resolve_string(&strings, header.prompt_string_id),
                        "kind": statement_kind_name(&statement.kind),
                    }));
                }
                if *json {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    for row in &rows {
                        println!("{}", row);
                    }
                }
            }
            IfrSubcommands::ShowIFR { filename } => {
                let (formset, strings) = first_formset(filename.as_deref())?;
                println!("{}", render_formset(&formset, &strings));
            }
        },
    }
    Ok(())
}

fn parse_terminal_type(name: &str) -> Result<TerminalType> {
    Ok(match name {
        "pc-ansi" => TerminalType::PcAnsi,
        "vt100" => TerminalType::Vt100,
        "vt100-plus" => TerminalType::Vt100Plus,
        "vt-utf8" => TerminalType::VtUtf8,
        "tty-term" => TerminalType::TtyTerm,
        "linux" => TerminalType::Linux,
        "xterm-r6" => TerminalType::XtermR6,
        "vt400" => TerminalType::Vt400,
        "sco" => TerminalType::Sco,
        other => return Err(anyhow!("unrecognized terminal type: {other}")),
    })
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

fn get_db_dump_bytes(filename: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(path) = filename {
        info!("using database dump from file: {}", path.display());
        let mut file = File::open(path).context(format!("opening dbdump from {}", path.display()))?;
        if file
            .metadata()
            .context("failed to read metadata for open file")?
            .len()
            > MAX_ALLOWED_FILESIZE
        {
            return Err(anyhow!("file size is too big for the file to be a HII database"));
        }
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .context("couldn't convert file bytes to Vec<u8>")?;
        Ok(contents)
    } else {
        extract::extract_db()
    }
}

/// Parses the first form package of the first package list in the dump,
/// returning it alongside that package list's merged string table.
fn first_formset(filename: Option<&Path>) -> Result<(FormSet, HashMap<u16, String>)> {
    let db = package::read_db(&get_db_dump_bytes(filename)?)?;
    let (package_list_guid, raw_forms) = db
        .forms
        .iter()
        .next()
        .ok_or_else(|| anyhow!("no form packages found in database"))?;
    let raw_form = raw_forms
        .first()
        .ok_or_else(|| anyhow!("empty form package list"))?;

    let formset = parse_form_set(&raw_form.bytes, None, raw_form.hii_handle)
        .context("failed to parse form package")?;

    let mut strings = HashMap::new();
    if let Some(maps) = db.strings.get(package_list_guid) {
        for map in maps {
            for (&id, text) in map {
                strings.entry(id as u16).or_insert_with(|| text.clone());
            }
        }
    }
    Ok((formset, strings))
}

fn resolve_string(strings: &HashMap<u16, String>, id: u16) -> String {
    strings
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("<string {id}>"))
}

fn statement_kind_name(kind: &StatementKind) -> &'static str {
    match kind {
        StatementKind::Subtitle { .. } => "subtitle",
        StatementKind::Text { .. } => "text",
        StatementKind::OneOf { .. } => "one_of",
        StatementKind::OneOfOption { .. } => "one_of_option",
        StatementKind::Numeric { .. } => "numeric",
        StatementKind::CheckBox { .. } => "check_box",
        StatementKind::OrderedList { .. } => "ordered_list",
        StatementKind::StringStatement { .. } => "string",
        StatementKind::Password { .. } => "password",
        StatementKind::Date { .. } => "date",
        StatementKind::Time { .. } => "time",
        StatementKind::Ref { .. } => "ref",
        StatementKind::Action { .. } => "action",
        StatementKind::ResetButton { .. } => "reset_button",
    }
}

fn render_formset(formset: &FormSet, strings: &HashMap<u16, String>) -> String {
    let mut out = String::new();
    out.push_str(&format!("form-set {}\n", formset.guid));
    for form in &formset.forms {
        out.push_str(&format!(
            "  form {:#06x}: {}\n",
            form.form_id,
            resolve_string(strings, form.title_string_id)
        ));
        for &statement_id in &form.statements {
            let statement = formset.statement(statement_id);
            let label = match statement.question_header() {
                Some(header) => resolve_string(strings, header.prompt_string_id),
                None => statement_kind_name(&statement.kind).to_string(),
            };
            out.push_str(&format!(
                "    [{}] {}\n",
                statement_kind_name(&statement.kind),
                label
            ));
        }
    }
    out
}
