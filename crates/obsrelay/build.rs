// Renders man pages and shell completions for packaging into
// $OUT_DIR/{man,completions}.

use std::fs;
use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::Shell;

// Only clap + clap_complete are needed to compile this module.
#[path = "src/cli.rs"]
mod cli;

fn main() -> io::Result<()> {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let Some(out_dir) = std::env::var_os("OUT_DIR") else {
        return Err(io::Error::other("OUT_DIR is not set"));
    };
    let out_dir = Path::new(&out_dir);

    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;
    write_man_pages(&cli::Cli::command(), &man_dir)?;

    let completion_dir = out_dir.join("completions");
    fs::create_dir_all(&completion_dir)?;
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        clap_complete::generate_to(shell, &mut cli::Cli::command(), "obsrelay", &completion_dir)?;
    }
    Ok(())
}

/// One page per visible command, named `obsrelay-<sub>.1` for subcommands.
fn write_man_pages(cmd: &clap::Command, dir: &Path) -> io::Result<()> {
    let mut page = Vec::new();
    clap_mangen::Man::new(cmd.clone()).render(&mut page)?;
    fs::write(dir.join(format!("{}.1", cmd.get_name())), page)?;

    for sub in cmd.get_subcommands().filter(|sub| !sub.is_hide_set()) {
        let qualified = format!("{}-{}", cmd.get_name(), sub.get_name());
        write_man_pages(&sub.clone().name(qualified), dir)?;
    }
    Ok(())
}
