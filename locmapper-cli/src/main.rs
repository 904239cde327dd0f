use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::warn;

use locmapper::{
    Error, FileFormat, FormatType, KeyMapping, LineKey, LineValue, LocFile, MergeReport,
    MergeStyle, StringsFile,
    formats::strings::{Component, escape_plist_string},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge localization source files into a loc file, creating it if
    /// necessary.
    Merge {
        /// The loc file to merge into
        #[arg(short, long)]
        loc: String,

        /// Environment the source files belong to (e.g. Xcode, Android)
        #[arg(short, long)]
        environment: String,

        /// Language of the source files
        #[arg(short = 'L', long)]
        language: String,

        /// Keep entries missing from the sources instead of dropping them
        #[arg(long)]
        keep_stale: bool,

        /// Source files or glob patterns (.strings or strings.xml)
        files: Vec<String>,
    },

    /// Export one language of one environment as an Xcode .strings file.
    Export {
        /// The loc file to read
        #[arg(short, long)]
        loc: String,

        /// Environment to export entries of
        #[arg(short, long)]
        environment: String,

        /// Language to resolve values for
        #[arg(short = 'L', long)]
        language: String,

        /// The output .strings file
        #[arg(short, long)]
        output: String,
    },

    /// Resolve a single key and print its value.
    Resolve {
        /// The loc file to read
        #[arg(short, long)]
        loc: String,

        /// Logical key to resolve
        #[arg(short, long)]
        key: String,

        /// Environment of the key
        #[arg(short, long)]
        environment: String,

        /// Source file of the key
        #[arg(short, long)]
        file: String,

        /// Language to resolve for
        #[arg(short = 'L', long)]
        language: String,
    },

    /// Store a key mapping, making the entry compute its values from
    /// another entry.
    Map {
        /// The loc file to modify
        #[arg(short, long)]
        loc: String,

        /// Logical key the mapping is stored under
        #[arg(short, long)]
        key: String,

        /// Environment of the key
        #[arg(short, long)]
        environment: String,

        /// Source file of the key
        #[arg(short, long)]
        file: String,

        /// The mapping as JSON (array of components, or `{"components": [...]}`)
        #[arg(short, long)]
        mapping: String,
    },

    /// Check a loc file for invalid mappings and missing translations.
    Lint {
        /// The loc file to check
        #[arg(short, long)]
        loc: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Error> {
    match command {
        Commands::Merge {
            loc,
            environment,
            language,
            keep_stale,
            files,
        } => {
            let style = if keep_stale {
                MergeStyle::Add
            } else {
                MergeStyle::Replace
            };
            merge(&loc, &environment, &language, style, &files)
        }
        Commands::Export {
            loc,
            environment,
            language,
            output,
        } => export(&loc, &environment, &language, &output),
        Commands::Resolve {
            loc,
            key,
            environment,
            file,
            language,
        } => {
            let table = LocFile::read_from(&loc)?;
            let probe = LineKey::new(key, environment, file);
            println!("{}", table.resolve_or_sentinel(&probe, &language));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Map {
            loc,
            key,
            environment,
            file,
            mapping,
        } => {
            let parsed = KeyMapping::from_json_str(&mapping);
            if !parsed.is_valid() {
                return Err(Error::DataMismatch(format!(
                    "mapping contains unrecognized components: {mapping}"
                )));
            }
            let mut table = LocFile::read_from(&loc)?;
            table.set_value(
                LineKey::new(key, environment, file),
                LineValue::Mapping(parsed),
            );
            table.write_to(&loc)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Lint { loc } => lint(&loc),
    }
}

fn merge(
    loc: &str,
    environment: &str,
    language: &str,
    style: MergeStyle,
    patterns: &[String],
) -> Result<ExitCode, Error> {
    let mut table = if Path::new(loc).exists() {
        LocFile::read_from(loc)?
    } else {
        LocFile::new()
    };

    let mut strings_files = Vec::new();
    let mut xml_files = Vec::new();
    for pattern in patterns {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::DataMismatch(format!("bad pattern `{pattern}`: {e}")))?;
        let mut matched = false;
        for path in paths.flatten() {
            matched = true;
            match FormatType::infer_from_path(&path)? {
                FormatType::Strings => strings_files.push((path, language.to_string())),
                FormatType::AndroidStrings => xml_files.push((path, language.to_string())),
                FormatType::LocFile => {
                    return Err(Error::UnsupportedFormat(format!(
                        "`{}` is a loc file, not a localization source",
                        path.display()
                    )));
                }
            }
        }
        if !matched {
            warn!("pattern `{pattern}` matched no files");
        }
    }

    let mut report = MergeReport::default();
    if !strings_files.is_empty() {
        extend_report(
            &mut report,
            table.merge_xcode_strings_files(environment, &strings_files, style),
        );
    }
    if !xml_files.is_empty() {
        extend_report(
            &mut report,
            table.merge_android_strings_files(environment, &xml_files, style),
        );
    }
    table.write_to(loc)?;

    println!("{} entries, {} languages", table.len(), table.languages().len());
    for key in &report.duplicates {
        eprintln!("duplicate key in sources: {key}");
    }
    for key in &report.stale {
        eprintln!("stale entry: {} ({})", key.logical_key, key.origin_file);
    }
    for (file, err) in &report.skipped_files {
        eprintln!("skipped {file}: {err}");
    }
    Ok(if report.skipped_files.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn extend_report(into: &mut MergeReport, from: MergeReport) {
    into.stale.extend(from.stale);
    into.duplicates.extend(from.duplicates);
    into.skipped_files.extend(from.skipped_files);
}

fn export(loc: &str, environment: &str, language: &str, output: &str) -> Result<ExitCode, Error> {
    let table = LocFile::read_from(loc)?;

    let mut keys: Vec<&LineKey> = table
        .entries()
        .map(|(k, _)| k)
        .filter(|k| k.environment == environment)
        .collect();
    keys.sort_by(|a, b| {
        (&a.origin_file, a.disambiguation_index, &a.logical_key).cmp(&(
            &b.origin_file,
            b.disambiguation_index,
            &b.logical_key,
        ))
    });

    let mut components = Vec::new();
    let mut exported = 0usize;
    for key in keys {
        let value = match table.resolve(key, language) {
            Ok(value) => value,
            Err(err) => {
                warn!("not exporting `{}`: {err}", key.logical_key);
                continue;
            }
        };
        if !key.comment.is_empty() {
            components.push(Component::Comment {
                text: format!("/* {} */", key.comment),
                is_block: true,
            });
            components.push(Component::Whitespace("\n".to_string()));
        }
        components.push(Component::LocalizedString {
            key: escape_plist_string(&key.logical_key),
            key_quoted: true,
            equals_separator: " = ".to_string(),
            value: escape_plist_string(&value),
            value_quoted: true,
            terminator: ";".to_string(),
        });
        components.push(Component::Whitespace("\n".to_string()));
        exported += 1;
    }

    StringsFile { components }.write_to(output)?;
    println!("{exported} entries written to {output}");
    Ok(ExitCode::SUCCESS)
}

fn lint(loc: &str) -> Result<ExitCode, Error> {
    let table = LocFile::read_from(loc)?;
    let mut problems = 0usize;

    for (key, value) in table.entries() {
        match value {
            LineValue::Mapping(mapping) => {
                if !mapping.is_valid() {
                    println!(
                        "invalid mapping: {} ({}, {})",
                        key.logical_key, key.environment, key.origin_file
                    );
                    problems += 1;
                    continue;
                }
                for language in table.languages() {
                    if let Err(err) = table.resolve(key, language) {
                        println!(
                            "{}: `{}` does not resolve for {language}: {err}",
                            key.environment, key.logical_key
                        );
                        problems += 1;
                    }
                }
            }
            LineValue::Entries(values) => {
                for language in table.languages() {
                    if !values.contains_key(language) {
                        println!(
                            "{}: `{}` has no value for {language}",
                            key.environment, key.logical_key
                        );
                        problems += 1;
                    }
                }
            }
        }
    }

    if problems == 0 {
        println!("ok: {} entries, {} languages", table.len(), table.languages().len());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{problems} problem(s) found");
        Ok(ExitCode::FAILURE)
    }
}
