//! Query result rendering: plain text, an HTML fragment, or JSON.
//!
//! Rendering is a pure function of a [`ResultWindow`] and the [`Query`]
//! that produced it; nothing here touches the store.

use anyhow::Result;

use crate::query::{Field, Query};
use crate::search::{Hit, ResultWindow};

/// Pages linked on either side of the current one in the HTML pager.
const PEEK_RANGE: u64 = 9;

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Html,
    Json,
}

pub fn render(
    format: OutputFormat,
    window: &ResultWindow,
    query: &Query,
    webpage_url: &str,
) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => render_text(window),
        OutputFormat::Html => render_html(window, query, webpage_url),
        OutputFormat::Json => serde_json::to_string_pretty(window)?,
    })
}

fn watch_url(hit: &Hit) -> String {
    let c = &hit.document.comment;
    format!(
        "https://www.youtube.com/watch?v={}&lc={}",
        c.video_id, c.comment_id
    )
}

// ============ Text ============

pub fn render_text(window: &ResultWindow) -> String {
    if window.items.is_empty() {
        if window.total_hits > 0 {
            return format!(
                "No results on page {} (last page is {}).\n",
                window.page, window.last_page
            );
        }
        return "No results.\n".to_string();
    }

    let first = window.first_rank();
    let last = first + window.items.len() as u64 - 1;
    let mut out = format!(
        "Results {}-{} of {} (page {} of {})\n\n",
        first, last, window.total_hits, window.page, window.last_page
    );

    for (i, hit) in window.items.iter().enumerate() {
        let c = &hit.document.comment;
        let v = &hit.document.video;
        let title = if v.title.is_empty() { "(unknown video)" } else { v.title.as_str() };

        out.push_str(&format!(
            "{}. [{:.2}] {} / {}\n",
            first + i as u64,
            hit.score,
            c.user_name,
            title
        ));
        if !v.channel_title.is_empty() {
            out.push_str(&format!("    channel: {}\n", v.channel_title));
        }
        out.push_str(&format!("    published: {}\n", c.publish_time));
        out.push_str(&format!("    likes: {}  replies: {}\n", c.like_count, c.reply_count));
        out.push_str(&format!(
            "    text: \"{}\"\n",
            hit.snippet.render("[[", "]]", |s| s.replace('\n', " "))
        ));
        if !c.video_id.is_empty() {
            out.push_str(&format!("    url: {}\n", watch_url(hit)));
        }
        if c.is_reply() {
            out.push_str(&format!("    reply to: {}\n", c.parent_id));
        }
        out.push_str(&format!("    id: {}\n\n", c.comment_id));
    }
    out
}

// ============ HTML ============

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn render_html(window: &ResultWindow, query: &Query, webpage_url: &str) -> String {
    let mut out = format!(
        "<h2>Results for query <u>{}</u></h2>\n",
        html_escape(query.get(Field::CommentText).unwrap_or(""))
    );
    let pager = pagination(window, query, webpage_url);
    out.push_str(&pager);

    let first = window.first_rank();
    for (i, hit) in window.items.iter().enumerate() {
        out.push_str(&result_card(first + i as u64, hit));
    }

    out.push_str(&pager);
    out
}

fn result_card(rank: u64, hit: &Hit) -> String {
    let c = &hit.document.comment;
    let v = &hit.document.video;
    let video_url = format!("https://www.youtube.com/watch?v={}", c.video_id);

    format!(
        "<p style='font-family:Roboto,Arial,sans-serif;'>\
<span style='font-size:1.3rem;font-weight:bold;'><i>{rank}</i>. \
<a href=\"https://www.youtube.com/channel/{user_id}\"><img src=\"{avatar}\" width=20 height=20>{user_name}</a>\
</span> commented on video<br>\
<table style='font-family:Roboto,Arial,sans-serif;'>\
<td><a href=\"{video_url}\"><img src=\"{thumbnail}\"></a></td>\
<td><a href=\"{video_url}\"><span style='font-size:1.2rem;font-weight:bold;'>{video_title}</span></a>\
<span style='font-size:0.7rem;font-weight:bold;'><br>  from channel: \
<a href=\"https://www.youtube.com/channel/{channel_id}\">{channel_title}</a><br></span>\
<a href=\"{comment_url}\"><span style='font-size:0.9rem;margin-left:2em;'>\"{text}\"</span></a>\
</td></table></p>\n",
        rank = rank,
        user_id = html_escape(&c.user_id),
        avatar = html_escape(&c.profile_picture),
        user_name = html_escape(&c.user_name),
        video_url = html_escape(&video_url),
        thumbnail = html_escape(&v.thumbnail_url),
        video_title = html_escape(&v.title),
        channel_id = html_escape(&v.channel_id),
        channel_title = html_escape(&v.channel_title),
        comment_url = html_escape(&watch_url(hit)),
        text = hit.snippet.render("<b>", "</b>", html_escape),
    )
}

/// Link to `page` carrying every query field, so the pager keeps the search.
fn page_link(window: &ResultWindow, query: &Query, webpage_url: &str, page: u64, label: &str) -> String {
    let mut href = format!("{}?page={}&max={}", webpage_url, page, window.page_size);
    for (param, field) in [
        ("commentQuery", Field::CommentText),
        ("usernameQuery", Field::UserName),
        ("userIdQuery", Field::UserId),
        ("videoTitleQuery", Field::VideoTitle),
        ("videoIdQuery", Field::VideoId),
        ("channelTitleQuery", Field::ChannelTitle),
        ("channelIdQuery", Field::ChannelId),
    ] {
        href.push('&');
        href.push_str(param);
        href.push('=');
        href.push_str(&urlencoding::encode(query.get(field).unwrap_or("")));
    }
    format!("<a href=\"{}\">{}</a>", html_escape(&href), label)
}

fn pagination(window: &ResultWindow, query: &Query, webpage_url: &str) -> String {
    let page = window.page as u64;
    let last = window.last_page;
    let mut html = String::new();

    if last > 1 {
        html.push_str("&nbsp&nbsp");
        if page != 1 {
            html.push_str(&page_link(window, query, webpage_url, 1, "First"));
            html.push_str("&nbsp&nbsp");
            html.push_str(&page_link(window, query, webpage_url, page - 1, "Prev"));
        }

        let low = page.saturating_sub(PEEK_RANGE).max(1);
        let high = (page + PEEK_RANGE).min(last);
        html.push_str(if low > 1 { " ..." } else { "&nbsp&nbsp" });
        for i in low..page.min(last + 1) {
            html.push_str(&page_link(window, query, webpage_url, i, &i.to_string()));
            html.push_str("&nbsp&nbsp");
        }
        html.push_str(&page.to_string());
        for i in page + 1..=high {
            html.push_str("&nbsp&nbsp");
            html.push_str(&page_link(window, query, webpage_url, i, &i.to_string()));
        }
        html.push_str(if high < last { "... " } else { "&nbsp&nbsp" });

        if page < last {
            html.push_str(&page_link(window, query, webpage_url, page + 1, "Next"));
            html.push_str("&nbsp&nbsp");
            html.push_str(&page_link(window, query, webpage_url, last, "Last"));
        }
    }

    let (from, to) = if window.items.is_empty() {
        (0, 0)
    } else {
        let from = window.first_rank();
        (from, from + window.items.len() as u64 - 1)
    };
    html.push_str(&format!(
        "<br><span style='margin-left:1em'>Displaying results {} ~ {} (page {} of {})<br></span>\n",
        from, to, page, last
    ));
    html
}
