//! Command-line parsing and dispatch.

use std::path::{
    Path,
    PathBuf,
};

use log::{
    info,
    warn,
};

use crate::{
    anki::{
        check_connection,
        AnkiConnect,
        NoteService,
    },
    clone::clone_notes_by_tags,
    core::{
        AnkiportError,
        Config,
        Result,
    },
    export::{
        export_html,
        export_notes,
        HtmlSelection,
        Selection,
    },
    package::{
        import_notes,
        ImportOptions,
        TemplateTable,
        DEFAULT_PACKAGE_NAME,
    },
    reorder::{
        reorder_files,
        DEFAULT_REORDER_OUTPUT,
    },
    tags::fetch_tag_tree,
    translate::{
        assemble_notes,
        run_translation,
        DeepLTranslator,
        TranslateOptions,
        TranslationSession,
    },
};

pub const USAGE: &str = "\
Usage: ankiport [--config PATH] [--url URL] <command> [options]

Commands:
  export   (--deck NAME | --tag TAG) [--output DIR]
           Export notes and their media to notes_data.json + media/
  import   JSON [--output FILE] [--deck NAME] [--media-folder DIR]
           Build an .apkg package from an exported notes file
  reorder  REFERENCE TARGET [--output-name NAME]
           Put TARGET notes back into REFERENCE order
  translate INPUT --target-lang LANG [--source-lang LANG] [--output-dir DIR]
           [--output-filename NAME] [--proxy URL] [--force] [--note-id ID]
           [--assemble-only]
           Translate note fields, one file per note, then assemble them
  clone    TAG... --deck NAME [--shuffle]
           Copy notes carrying all TAGs into another deck
  html     (--deck NAME | --tag TAG | --search TERMS [--top-deck NAME]) [--output DIR]
           Render card answers into a static HTML page
  decks    List all decks
  tags     Print the tag hierarchy
  help     Show this message
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Export { selection: Selection, output: Option<PathBuf> },
    Import { json: PathBuf, output: PathBuf, deck: Option<String>, media_folder: Option<PathBuf> },
    Reorder { reference: PathBuf, target: PathBuf, output_name: String },
    Translate(TranslateArgs),
    Clone { tags: Vec<String>, deck: String, shuffle: bool },
    Html { selection: HtmlSelection, output: Option<PathBuf> },
    Decks,
    Tags,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslateArgs {
    pub input: PathBuf,
    pub target_lang: String,
    pub source_lang: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub proxy: Option<String>,
    pub force: bool,
    pub note_id: Option<u64>,
    pub assemble_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config_path: Option<PathBuf>,
    pub url: Option<String>,
    pub command: Command,
}

fn usage_error(message: impl Into<String>) -> AnkiportError {
    AnkiportError::InvalidInput(message.into())
}

fn take_value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| usage_error(format!("{flag} needs a value")))
}

fn unexpected(arg: &str, command: &str) -> AnkiportError {
    usage_error(format!("unexpected argument '{arg}' for '{command}'"))
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Cli> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut url = None;

    let command_name = loop {
        match args.next() {
            None => break "help".to_string(),
            Some(arg) => match arg.as_str() {
                "--config" => config_path = Some(PathBuf::from(take_value(&mut args, "--config")?)),
                "--url" => url = Some(take_value(&mut args, "--url")?),
                _ => break arg.clone(),
            },
        }
    };

    let rest: Vec<String> = args.collect();
    let command = match command_name.as_str() {
        "export" => parse_export(rest)?,
        "import" => parse_import(rest)?,
        "reorder" => parse_reorder(rest)?,
        "translate" => parse_translate(rest)?,
        "clone" => parse_clone(rest)?,
        "html" => parse_html(rest)?,
        "decks" => Command::Decks,
        "tags" => Command::Tags,
        "help" | "-h" | "--help" => Command::Help,
        other => return Err(usage_error(format!("unknown command '{other}'"))),
    };

    Ok(Cli { config_path, url, command })
}

fn parse_export(args: Vec<String>) -> Result<Command> {
    let mut selection = None;
    let mut output = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--deck" | "-d" => selection = Some(Selection::Deck(take_value(&mut iter, &arg)?)),
            "--tag" | "-t" => selection = Some(Selection::Tag(take_value(&mut iter, &arg)?)),
            "--output" | "-o" => output = Some(PathBuf::from(take_value(&mut iter, &arg)?)),
            _ => return Err(unexpected(&arg, "export")),
        }
    }
    let selection = selection.ok_or_else(|| usage_error("export needs --deck or --tag"))?;
    Ok(Command::Export { selection, output })
}

fn parse_import(args: Vec<String>) -> Result<Command> {
    let mut json = None;
    let mut output = PathBuf::from(DEFAULT_PACKAGE_NAME);
    let mut deck = None;
    let mut media_folder = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--output" | "-o" => output = PathBuf::from(take_value(&mut iter, &arg)?),
            "--deck" | "-d" => deck = Some(take_value(&mut iter, &arg)?),
            "--media-folder" | "-m" => media_folder = Some(PathBuf::from(take_value(&mut iter, &arg)?)),
            _ if json.is_none() && !arg.starts_with('-') => json = Some(PathBuf::from(&arg)),
            _ => return Err(unexpected(&arg, "import")),
        }
    }
    let json = json.ok_or_else(|| usage_error("import needs the path of a notes JSON file"))?;
    Ok(Command::Import { json, output, deck, media_folder })
}

fn parse_reorder(args: Vec<String>) -> Result<Command> {
    let mut positional = Vec::new();
    let mut output_name = DEFAULT_REORDER_OUTPUT.to_string();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--output-name" | "-o" => output_name = take_value(&mut iter, &arg)?,
            _ if !arg.starts_with('-') && positional.len() < 2 => positional.push(PathBuf::from(&arg)),
            _ => return Err(unexpected(&arg, "reorder")),
        }
    }
    let mut positional = positional.into_iter();
    match (positional.next(), positional.next()) {
        (Some(reference), Some(target)) => Ok(Command::Reorder { reference, target, output_name }),
        _ => Err(usage_error("reorder needs REFERENCE and TARGET files")),
    }
}

fn parse_translate(args: Vec<String>) -> Result<Command> {
    let mut input = None;
    let mut target_lang = None;
    let mut source_lang = Some("ja".to_string());
    let mut output_dir = None;
    let mut output_filename = None;
    let mut proxy = None;
    let mut force = false;
    let mut note_id = None;
    let mut assemble_only = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--target-lang" | "-t" => target_lang = Some(take_value(&mut iter, &arg)?),
            "--source-lang" | "-s" => {
                let value = take_value(&mut iter, &arg)?;
                source_lang = if value.eq_ignore_ascii_case("auto") { None } else { Some(value) };
            }
            "--output-dir" | "-o" => output_dir = Some(PathBuf::from(take_value(&mut iter, &arg)?)),
            "--output-filename" => output_filename = Some(take_value(&mut iter, &arg)?),
            "--proxy" | "--deepl-proxy" => proxy = Some(take_value(&mut iter, &arg)?),
            "--force" => force = true,
            "--assemble-only" => assemble_only = true,
            "--note-id" => {
                let value = take_value(&mut iter, &arg)?;
                let id = value.parse().map_err(|_| usage_error(format!("invalid note id '{value}'")))?;
                note_id = Some(id);
            }
            _ if input.is_none() && !arg.starts_with('-') => input = Some(PathBuf::from(&arg)),
            _ => return Err(unexpected(&arg, "translate")),
        }
    }

    let input = input.ok_or_else(|| usage_error("translate needs the path of a notes JSON file"))?;
    let target_lang = match target_lang {
        Some(lang) => lang,
        None if assemble_only => String::new(),
        None => return Err(usage_error("translate needs --target-lang")),
    };
    Ok(Command::Translate(TranslateArgs {
        input,
        target_lang,
        source_lang,
        output_dir,
        output_filename,
        proxy,
        force,
        note_id,
        assemble_only,
    }))
}

fn parse_clone(args: Vec<String>) -> Result<Command> {
    let mut tags = Vec::new();
    let mut deck = None;
    let mut shuffle = false;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--deck" | "-d" => deck = Some(take_value(&mut iter, &arg)?),
            "--shuffle" => shuffle = true,
            _ if !arg.starts_with('-') => tags.push(arg.clone()),
            _ => return Err(unexpected(&arg, "clone")),
        }
    }
    if tags.is_empty() {
        return Err(usage_error("clone needs at least one tag"));
    }
    let deck = deck.ok_or_else(|| usage_error("clone needs --deck"))?;
    Ok(Command::Clone { tags, deck, shuffle })
}

fn parse_html(args: Vec<String>) -> Result<Command> {
    let mut selection = None;
    let mut top_deck = None;
    let mut output = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--deck" | "-d" => selection = Some(HtmlSelection::Deck(take_value(&mut iter, &arg)?)),
            "--tag" | "-t" => selection = Some(HtmlSelection::Tag(take_value(&mut iter, &arg)?)),
            "--search" | "-s" => {
                let terms = take_value(&mut iter, &arg)?
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                selection = Some(HtmlSelection::Terms { terms, top_deck: None });
            }
            "--top-deck" => top_deck = Some(take_value(&mut iter, &arg)?),
            "--output" | "-o" => output = Some(PathBuf::from(take_value(&mut iter, &arg)?)),
            _ => return Err(unexpected(&arg, "html")),
        }
    }

    let selection = match (selection, top_deck) {
        (Some(HtmlSelection::Terms { terms, .. }), top_deck) => {
            if terms.is_empty() {
                return Err(usage_error("--search needs at least one term"));
            }
            HtmlSelection::Terms { terms, top_deck }
        }
        (Some(_), Some(_)) => return Err(usage_error("--top-deck only applies to --search")),
        (Some(selection), None) => selection,
        (None, _) => return Err(usage_error("html needs --deck, --tag or --search")),
    };
    Ok(Command::Html { selection, output })
}

fn connect(config: &Config) -> Result<AnkiConnect> {
    let anki = AnkiConnect::from_config(config)?;
    check_connection(&anki)?;
    Ok(anki)
}

/// `dir/name` when `name` is relative, `name` otherwise.
fn beside(file: &Path, name: &Path) -> PathBuf {
    file.parent().unwrap_or_else(|| Path::new("")).join(name)
}

pub fn run(cli: Cli) -> Result<()> {
    if cli.command == Command::Help {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load(cli.config_path.as_deref())?;
    if let Some(url) = cli.url {
        config.anki_connect_url = url;
    }

    match cli.command {
        Command::Export { selection, output } => {
            let anki = connect(&config)?;
            let output = output.unwrap_or_else(|| selection.default_output_dir());
            export_notes(&anki, &selection, &output)?;
        }
        Command::Import { json, output, deck, media_folder } => {
            let options = ImportOptions { deck_name: deck, media_dir: media_folder.map(|m| beside(&json, &m)) };
            let templates = TemplateTable::with_overrides(&config.templates);
            let report = import_notes(&json, &output, &options, &templates)?;
            if !report.missing_media.is_empty() {
                warn!("{} referenced media files were missing", report.missing_media.len());
            }
        }
        Command::Reorder { reference, target, output_name } => {
            let output = beside(&target, Path::new(&output_name));
            reorder_files(&reference, &target, &output)?;
        }
        Command::Translate(args) => run_translate(args, &mut config)?,
        Command::Clone { tags, deck, shuffle } => {
            let anki = connect(&config)?;
            let report = clone_notes_by_tags(&anki, &tags, &deck, shuffle, &mut rand::rng())?;
            info!("Cloned {} notes into '{}'", report.added.iter().flatten().count(), deck);
        }
        Command::Html { selection, output } => {
            let anki = connect(&config)?;
            let output = output.unwrap_or_else(|| selection.default_output_dir());
            let report = export_html(&anki, &selection, &output)?;
            if !report.unique_tags.is_empty() {
                info!("Tags found: {}", report.unique_tags.join(", "));
            }
        }
        Command::Decks => {
            let anki = connect(&config)?;
            let decks = anki.deck_names()?;
            if decks.is_empty() {
                println!("No decks found.");
            } else {
                println!("Available decks:");
                for deck in decks {
                    println!("- {deck}");
                }
            }
        }
        Command::Tags => {
            let anki = connect(&config)?;
            let tree = fetch_tag_tree(&anki)?;
            if tree.is_empty() {
                println!("No tags found.");
            } else {
                print!("{tree}");
            }
        }
        Command::Help => {}
    }
    Ok(())
}

fn run_translate(args: TranslateArgs, config: &mut Config) -> Result<()> {
    let mut options = TranslateOptions::beside(&args.input);
    if let Some(dir) = &args.output_dir {
        options.notes_dir = beside(&args.input, dir);
    }
    if let Some(name) = &args.output_filename {
        options.assembled_path = beside(&args.input, Path::new(name));
    }
    options.force = args.force;
    options.note_id = args.note_id;
    options.assemble_only = args.assemble_only;

    if options.assemble_only {
        info!("Assemble-only mode, skipping translation");
        assemble_notes(&options.notes_dir, &options.assembled_path)?;
        return Ok(());
    }

    if args.proxy.is_some() {
        config.translation.backend.proxy = args.proxy;
    }
    let translator = DeepLTranslator::from_config(config, args.source_lang.as_deref(), &args.target_lang)?;
    let session = TranslationSession::from_config(translator, &config.translation);
    run_translation(&args.input, &options, &config.translation.rules, &session)?;
    Ok(())
}
