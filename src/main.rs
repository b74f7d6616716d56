//! # Quire CLI
//!
//! Usage:
//!   quire render proposal.json --surface public -o proposal.html
//!   echo '{ ... }' | quire export --vars vars.json
//!   quire height proposal.json
//!   quire share proposal.json --qr
//!   quire example > proposal.json

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quire::canvas::compute_canvas_height;
use quire::{api, share, EngineConfig, QuireError, Selection, Surface, Variable};

#[derive(Parser)]
#[command(name = "quire")]
#[command(author, version, about = "Render and share proposal documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a proposal to HTML for one surface
    Render {
        /// Proposal JSON (reads stdin when omitted)
        input: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = SurfaceArg::Public)]
        surface: SurfaceArg,
        /// JSON array of `{ "name", "value" }` variables
        #[arg(long)]
        vars: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the export snapshot (`{ html, options }`) as JSON
    Export {
        input: Option<PathBuf>,
        #[arg(long)]
        vars: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print each section's canvas height
    Height { input: Option<PathBuf> },
    /// Print the public share link of a proposal
    Share {
        input: Option<PathBuf>,
        /// Origin to build the link on (defaults to the configured one)
        #[arg(long)]
        base: Option<String>,
        /// Also print the link as an SVG QR code
        #[arg(long)]
        qr: bool,
    },
    /// Print a sample proposal
    Example,
}

#[derive(Clone, Copy, ValueEnum)]
enum SurfaceArg {
    Editor,
    Modal,
    Public,
    Export,
}

impl From<SurfaceArg> for Surface {
    fn from(arg: SurfaceArg) -> Self {
        match arg {
            SurfaceArg::Editor => Surface::Editor(Selection::none()),
            SurfaceArg::Modal => Surface::Modal,
            SurfaceArg::Public => Surface::Public,
            SurfaceArg::Export => Surface::Export,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), QuireError> {
    let config = EngineConfig::load(&std::env::current_dir()?)?;

    match command {
        Command::Render {
            input,
            surface,
            vars,
            output,
        } => {
            let json = read_input(input.as_ref())?;
            let html = quire::render_json(&json, &read_vars(vars.as_ref())?, &surface.into(), &config)?;
            write_output(output.as_ref(), &html)
        }
        Command::Export {
            input,
            vars,
            output,
        } => {
            let json = read_input(input.as_ref())?;
            let snapshot = quire::export_json(&json, &read_vars(vars.as_ref())?, &config)?;
            write_output(output.as_ref(), &serde_json::to_string_pretty(&snapshot)?)
        }
        Command::Height { input } => {
            let raw: serde_json::Value = serde_json::from_str(&read_input(input.as_ref())?)?;
            let proposal = api::normalize_proposal(&raw)?;
            for section in &proposal.sections {
                println!(
                    "{}\t{}\t{}",
                    section.id,
                    compute_canvas_height(section, &config.canvas),
                    section.title
                );
            }
            Ok(())
        }
        Command::Share { input, base, qr } => {
            let raw: serde_json::Value = serde_json::from_str(&read_input(input.as_ref())?)?;
            let proposal = api::normalize_proposal(&raw)?;
            let url = share::public_url(
                &proposal,
                base.as_deref().unwrap_or(&config.share_base_url),
            )?;
            println!("{}", url);
            if qr {
                println!("{}", share::share_qr_svg(&url)?);
            }
            Ok(())
        }
        Command::Example => {
            print!("{}", example_proposal_json());
            Ok(())
        }
    }
}

fn read_input(path: Option<&PathBuf>) -> Result<String, QuireError> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn read_vars(path: Option<&PathBuf>) -> Result<Vec<Variable>, QuireError> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(vec![]),
    }
}

fn write_output(path: Option<&PathBuf>, content: &str) -> Result<(), QuireError> {
    match path {
        Some(path) => {
            fs::write(path, content)?;
            info!(bytes = content.len(), path = %path.display(), "Written");
            Ok(())
        }
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

fn example_proposal_json() -> &'static str {
    r##"{
  "id": "prop-001",
  "title": "Website Redesign for {{ClientName}}",
  "client": "Acme Corp",
  "status": "draft",
  "titleStyles": { "fontSize": 36, "color": "#111827" },
  "settings": { "sharing": { "public": true, "token": "AZJx3m5wd3KmR0c1a2b3cQ" } },
  "sections": [
    {
      "id": "intro",
      "title": "Introduction",
      "layout": "single",
      "content": "<p>Hello {{ClientName}}, thank you for the opportunity.</p>",
      "contentStyles": { "gapAfter": 10 },
      "texts": [
        { "id": "note", "top": 360, "left": 40, "width": 240, "content": "<p><strong>Valid</strong> for 30 days</p>" }
      ]
    },
    {
      "id": "scope",
      "title": "Scope",
      "layout": "two-column",
      "columnContents": ["<p>Design</p><ul><li>Wireframes</li><li>Visual design</li></ul>", "<p>Build</p>"],
      "columnStyles": [
        { "backgroundColor": "#f3f4f6", "paddingTop": 12, "paddingLeft": 12 },
        { "backgroundColor": "#ecfdf5", "paddingTop": 12, "paddingLeft": 12 }
      ],
      "shapes": [
        { "id": "badge", "type": "circle", "top": 20, "left": 520, "width": 80, "height": 80, "backgroundColor": "#3b82f6" }
      ],
      "tables": [
        {
          "id": "timeline", "top": 120, "left": 40, "width": 360, "height": 90, "rows": 2, "columns": 2,
          "cells": [
            [{ "id": "a1", "content": "Phase" }, { "id": "a2", "content": "Weeks" }],
            [{ "id": "b1", "content": "Design" }, { "id": "b2", "content": "3" }]
          ]
        }
      ]
    }
  ],
  "pricing": {
    "currency": "USD",
    "taxRate": 8.5,
    "items": [
      { "id": "li-1", "description": "Design", "quantity": 1, "unitPrice": 4500 },
      { "id": "li-2", "description": "Development", "quantity": 60, "unitPrice": 120 }
    ]
  }
}
"##
}
