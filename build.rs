use anyhow::Result;
use vergen::EmitBuilder;

fn main() -> Result<()> {
    // Falls back to placeholder values outside a git checkout.
    EmitBuilder::builder().git_sha(true).git_commit_date().emit()?;
    Ok(())
}
