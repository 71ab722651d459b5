//! CLI argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// mochi - chat bot console and legacy QQ packet tools
#[derive(Parser, Debug)]
#[command(name = "mochi", version, about = "Chat bot console and legacy QQ packet tools")]
pub struct Cli {
    /// Use a custom mochi home directory (overrides MOCHI_HOME)
    #[arg(long, global = true, value_name = "PATH")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum CliCommand {
    /// Read commands from stdin until `stop` or end of input
    Console,

    /// Run one command line as the console
    Exec {
        /// The command line; words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },

    /// Decode a raw server frame given as hex
    Decode {
        /// Key tried for every decryption layer (defaults to [protocol] session_key)
        #[arg(long, value_name = "HEX")]
        key: Option<String>,

        /// Frame bytes; whitespace between hex digits is ignored
        #[arg(required = true)]
        frame: Vec<String>,
    },

    /// Encrypt or decrypt a buffer with TEA
    Tea {
        #[arg(value_enum)]
        direction: TeaDirection,

        /// 16-byte key as hex
        #[arg(long, value_name = "HEX")]
        key: String,

        /// Input bytes as hex
        #[arg(required = true)]
        data: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TeaDirection {
    Encrypt,
    Decrypt,
}

/// Join hex words given as separate arguments.
pub fn join_hex(words: &[String]) -> String {
    words.join(" ")
}
