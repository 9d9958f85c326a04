use chrono::NaiveDate;
use corner_core::shell::View;
use corner_core::Tag;

use crate::commands::common::{format_recording_lines, recording_to_list_item, App, RecordingListItem};
use crate::error::CliError;

pub struct ListOptions {
    pub date: Option<NaiveDate>,
    pub tag: Option<Tag>,
    pub dates: bool,
    pub json: bool,
}

pub async fn run_list(app: &mut App, options: ListOptions) -> Result<(), CliError> {
    app.open(View::Catalog)?;
    let mut catalog = app.load_catalog().await?;

    if options.dates {
        let dates = catalog.available_dates();
        if options.json {
            println!("{}", serde_json::to_string_pretty(&dates)?);
        } else {
            for date in dates {
                println!("{date}");
            }
        }
        return Ok(());
    }

    catalog.select_date(options.date);
    let recordings = catalog.select_tag(options.tag);

    if options.json {
        let items = recordings
            .iter()
            .map(recording_to_list_item)
            .collect::<Vec<RecordingListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if recordings.is_empty() {
        eprintln!("No recordings found");
    } else {
        for line in format_recording_lines(recordings) {
            println!("{line}");
        }
    }

    Ok(())
}
