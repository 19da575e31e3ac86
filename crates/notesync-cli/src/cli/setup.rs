use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "notesync", bin_name = "notesync", version, disable_help_subcommand = true)]
#[command(about = "Notes, tags and notebooks over a realtime store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config file
    #[arg(long, global = true, value_name = "FILE", help_heading = "Options")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help_heading = "Options")]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in, reusing the stored credential when there is one
    Login {
        /// Local account to sign in as (defaults to $USER)
        #[arg(long)]
        user: Option<String>,
    },

    /// Sign out and forget the stored credential
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Work with notes
    #[command(subcommand)]
    Note(NoteCommands),

    /// Render a location (/, /notes, /user/<id>) as HTML
    Render {
        #[arg(default_value = "/")]
        location: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Create a note
    New(NewNote),

    /// Show one note
    Show { id: String },

    /// List all notes
    #[command(alias = "ls")]
    List,

    /// Change a note's title, url or description
    Edit(EditNote),

    /// Add a tag
    Tag { id: String, tag: String },

    /// Remove a tag
    Untag { id: String, tag: String },

    /// Move into a notebook, or out of it with no name
    Move { id: String, notebook: Option<String> },

    /// Delete a note
    #[command(alias = "delete")]
    Rm { id: String },
}

#[derive(Args, Debug)]
pub struct NewNote {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub notebook: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    /// Repeat for several tags
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct EditNote {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}
