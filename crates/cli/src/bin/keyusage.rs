use anyhow::Result;

fn main() -> Result<()> {
    keyusage_cli::main_entry()
}
