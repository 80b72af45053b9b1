//! Fields command: list the selectors accepted for `local.subject` / `local.object`

use clap::Args;

use relsync_directory::FieldFactory;

use crate::config::CliConfig;
use crate::error::CliResult;

#[derive(Args, Debug)]
pub struct FieldsArgs {
    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: FieldsArgs, config: CliConfig) -> CliResult<()> {
    let directory = super::connect_directory(&config).await?;
    let fields = FieldFactory::new(directory)
        .list_mappable_fields_for_config()
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
    } else {
        let width = fields.keys().map(String::len).max().unwrap_or(0);
        for (selector, label) in &fields {
            println!("{selector:<width$}  {label}");
        }
    }
    Ok(())
}
