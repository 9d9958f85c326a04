use corner_core::shell::View;
use corner_core::Tag;

use crate::commands::common::App;
use crate::error::CliError;

/// The selectable vocabulary, or the tags in use with `used`.
pub async fn run_tags(app: &mut App, used: bool) -> Result<(), CliError> {
    let tags = if used {
        app.open(View::Catalog)?;
        app.load_catalog().await?.available_tags()
    } else {
        Tag::selectable().collect()
    };

    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}
