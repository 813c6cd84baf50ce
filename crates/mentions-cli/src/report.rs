use std::fmt::Write as _;

use clap::Subcommand;
use mentions_db::MentionRow;

/// Sub-commands available under `report`.
#[derive(Debug, Subcommand)]
pub enum ReportCommands {
    /// Mentions of one product code
    Sku {
        /// Product code (e.g. 12345678)
        code: i64,
    },
    /// Mentions of any product of a brand
    Brand {
        /// Brand name, case-insensitive
        name: String,
    },
}

struct PostGroup<'a> {
    row: &'a MentionRow,
    skus: Vec<(i64, &'a str)>,
}

struct ChannelGroup<'a> {
    row: &'a MentionRow,
    posts: Vec<PostGroup<'a>>,
}

/// Renders mention rows as channel, then post, then product lines. Channels
/// appear in the order of their first row.
pub(crate) fn format_report(rows: &[MentionRow]) -> String {
    let mut channels: Vec<ChannelGroup<'_>> = Vec::new();
    for row in rows {
        let index = match channels
            .iter()
            .position(|c| c.row.channel_link == row.channel_link)
        {
            Some(index) => index,
            None => {
                channels.push(ChannelGroup {
                    row,
                    posts: Vec::new(),
                });
                channels.len() - 1
            }
        };
        let posts = &mut channels[index].posts;
        match posts
            .iter_mut()
            .find(|p| p.row.remote_message_id == row.remote_message_id)
        {
            Some(post) => post.skus.push((row.sku_code, &row.brand_name)),
            None => posts.push(PostGroup {
                row,
                skus: vec![(row.sku_code, &row.brand_name)],
            }),
        }
    }

    let mut out = String::new();
    for channel in &channels {
        let followers = channel
            .row
            .follower_count
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        let _ = writeln!(
            out,
            "{} ({}, {followers} followers)",
            channel.row.channel_link,
            channel.row.channel_title.as_deref().unwrap_or("untitled"),
        );
        for post in &channel.posts {
            let _ = writeln!(
                out,
                "  #{} {}  views {}  ER {:.2}%",
                post.row.remote_message_id,
                post.row.published_at.format("%Y-%m-%d %H:%M"),
                post.row.views,
                post.row.engagement_rate,
            );
            for (code, brand) in &post.skus {
                let _ = writeln!(out, "    {code} {brand}");
            }
        }
    }
    out
}

/// # Errors
///
/// Returns an error if the mentions cannot be read.
pub(crate) async fn run_report(pool: &sqlx::PgPool, command: ReportCommands) -> anyhow::Result<()> {
    let rows = match &command {
        ReportCommands::Sku { code } => mentions_db::mentions_by_sku(pool, *code).await?,
        ReportCommands::Brand { name } => {
            let Some(brand) = mentions_db::get_brand_by_name(pool, name).await? else {
                println!("unknown brand: {name}");
                return Ok(());
            };
            mentions_db::mentions_by_brand(pool, &brand.name).await?
        }
    };

    if rows.is_empty() {
        println!("no mentions found");
        return Ok(());
    }
    print!("{}", format_report(&rows));
    println!("{} mentions", rows.len());
    Ok(())
}

/// # Errors
///
/// Returns an error if the run ledger cannot be read.
pub(crate) async fn run_list_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = mentions_db::list_crawl_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no crawl runs recorded");
        return Ok(());
    }

    for run in &runs {
        let finished = run
            .completed_at
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{:>5}  {:<9}  {:<9}  {}  finished {finished}  records {}",
            run.id,
            run.run_type,
            run.status,
            run.created_at.format("%Y-%m-%d %H:%M"),
            run.records_processed,
        );
        if let Some(message) = &run.error_message {
            println!("       error: {message}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn row(link: &str, message: i64, sku: i64) -> MentionRow {
        MentionRow {
            channel_link: link.to_string(),
            channel_title: Some("Deals".to_string()),
            follower_count: Some(1200),
            remote_message_id: message,
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            views: 500,
            engagement_rate: 1.25,
            sku_code: sku,
            brand_name: "Glow".to_string(),
        }
    }

    #[test]
    fn groups_rows_by_channel_then_post() {
        let rows = vec![
            row("t.me/deals", 7, 11_111_111),
            row("t.me/other", 3, 11_111_111),
            row("t.me/deals", 7, 22_222_222),
        ];

        let report = format_report(&rows);

        assert_eq!(
            report,
            "t.me/deals (Deals, 1200 followers)\n\
             \x20 #7 2024-03-01 12:30  views 500  ER 1.25%\n\
             \x20   11111111 Glow\n\
             \x20   22222222 Glow\n\
             t.me/other (Deals, 1200 followers)\n\
             \x20 #3 2024-03-01 12:30  views 500  ER 1.25%\n\
             \x20   11111111 Glow\n"
        );
    }

    #[test]
    fn unknown_follower_count_is_marked() {
        let mut only = row("t.me/deals", 1, 5);
        only.follower_count = None;
        only.channel_title = None;

        let report = format_report(&[only]);

        assert!(report.starts_with("t.me/deals (untitled, ? followers)\n"));
    }

    #[test]
    fn empty_rows_render_nothing() {
        assert!(format_report(&[]).is_empty());
    }
}
