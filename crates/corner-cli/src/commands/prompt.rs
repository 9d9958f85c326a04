use corner_core::prompts::{PromptCategory, PromptClient, PromptSource};
use corner_core::shell::View;

use crate::commands::common::App;
use crate::error::CliError;

pub async fn run_prompt(app: &mut App, category: PromptCategory) -> Result<(), CliError> {
    app.open(View::Prompts)?;

    let client =
        PromptClient::new(&app.config.api_base_url)?.with_access_token(app.session.access_token()?);
    let prompt = client.generate(category).await;
    if prompt.source == PromptSource::Fallback {
        tracing::info!(category = category.slug(), "Showing an offline prompt");
    }
    println!("{}", prompt.text);
    Ok(())
}
