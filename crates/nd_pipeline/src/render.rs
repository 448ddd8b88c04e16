use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use nd_core::{Category, Error, Result, Story, StoryCategorySet};

pub const DATE_SLOT: &str = "GENERATION_DATE";
pub const TIMESTAMP_SLOT: &str = "GENERATION_TIMESTAMP";

const LEAD_CLASS: &str = "story-lead";

/// Render the digest page from `template`.
///
/// Every `{{SLOT}}` in the template must be one of the known slots; anything
/// else fails the render rather than leaking a placeholder into the page.
/// Slots the template omits are fine.
pub fn render_page(
    template: &str,
    stories: &StoryCategorySet,
    date: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let mut values: HashMap<&str, String> = HashMap::new();
    values.insert(DATE_SLOT, date.format("%A, %B %-d, %Y").to_string());
    values.insert(
        TIMESTAMP_SLOT,
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    for category in Category::ALL {
        values.insert(category.slot(), render_category(category, stories.stories(category))?);
    }
    substitute(template, &values)
}

fn render_category(category: Category, stories: &[Story]) -> Result<String> {
    if stories.is_empty() {
        return Ok("<p class=\"no-stories\">No stories available.</p>\n".to_string());
    }
    let mut html = String::new();
    for story in stories {
        html.push_str(&render_story(story, category == Category::LEAD)?);
    }
    Ok(html)
}

fn render_story(story: &Story, lead: bool) -> Result<String> {
    let mut html = String::from("<article class=\"story");
    if lead {
        html.push(' ');
        html.push_str(LEAD_CLASS);
    }
    html.push('"');
    if let Some(expansion) = &story.expansion {
        let data = serde_json::to_string(expansion)?;
        let _ = write!(html, " data-expansion=\"{}\"", html_escape(&data));
    }
    let _ = write!(
        html,
        ">\n  <h3 class=\"story-headline\">{}</h3>\n  <p class=\"story-summary\">{}</p>\n  <p class=\"story-source\">Source: {}</p>\n</article>\n",
        html_escape(&story.headline),
        html_escape(&story.summary),
        html_escape(&story.attribution)
    );
    Ok(html)
}

fn is_slot_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

fn is_placeholder_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn render_error(message: &str, near: &str) -> Error {
    Error::Render(format!(
        "{} near {{{{{}",
        message,
        near.chars().take(32).collect::<String>()
    ))
}

/// Single left-to-right pass; substituted values are never rescanned.
///
/// `{{` followed by a letter, digit or underscore opens a placeholder, which
/// must be a known `UPPER_SNAKE` slot closed by `}}`. `{{` followed by
/// anything else is copied as is, so inline scripts and styles survive.
fn substitute(template: &str, values: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        if !after.starts_with(is_placeholder_char) {
            out.push_str("{{");
            rest = after;
            continue;
        }

        let name_len = after
            .find(|c: char| !is_placeholder_char(c))
            .unwrap_or(after.len());
        let name = &after[..name_len];
        if !after[name_len..].starts_with("}}") {
            return Err(render_error("Malformed template slot", after));
        }
        if !name.chars().all(is_slot_char) {
            return Err(render_error("Template slots must be upper case", after));
        }
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(Error::Render(format!(
                    "Unknown template slot: {{{{{}}}}}",
                    name
                )))
            }
        }
        rest = &after[name_len + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_core::Expansion;

    const TEMPLATE: &str = "<!DOCTYPE html>\n<html><head><style>body {{ margin: 0 }}</style></head><body>\n<p>{{GENERATION_DATE}}</p><time>{{GENERATION_TIMESTAMP}}</time>\n<section>{{TOP_HEADLINES}}</section>\n<section>{{NATIONAL}}</section>\n<section>{{GAMING}}</section>\n</body></html>\n";

    fn story(headline: &str) -> Story {
        Story {
            headline: headline.to_string(),
            summary: format!("{} summary", headline),
            attribution: "Reuters".to_string(),
            expansion: None,
        }
    }

    fn dataset() -> StoryCategorySet {
        let mut set = StoryCategorySet::default();
        set.insert(Category::TopHeadlines, vec![story("Lead one"), story("Lead two")]);
        set.insert(Category::National, vec![story("Budget passes")]);
        set
    }

    fn when() -> (NaiveDate, DateTime<Utc>) {
        let at = DateTime::parse_from_rfc3339("2025-03-07T06:00:12.345Z")
            .unwrap()
            .with_timezone(&Utc);
        (at.date_naive(), at)
    }

    #[test]
    fn test_render_fills_slots() {
        let (date, at) = when();
        let html = render_page(TEMPLATE, &dataset(), date, at).unwrap();

        assert!(html.contains("<p>Friday, March 7, 2025</p>"));
        assert!(html.contains("<time>2025-03-07T06:00:12Z</time>"));
        assert!(html.contains("Budget passes"));
        assert!(html.contains("<section><p class=\"no-stories\">"));
        assert!(html.contains("body {{ margin: 0 }}"));
        assert!(!html.contains("{{GAMING}}"));
    }

    #[test]
    fn test_render_is_pure() {
        let (date, at) = when();
        let set = dataset();
        assert_eq!(
            render_page(TEMPLATE, &set, date, at).unwrap(),
            render_page(TEMPLATE, &set, date, at).unwrap()
        );
    }

    #[test]
    fn test_lead_marker_only_on_lead_category() {
        let (date, at) = when();
        let html = render_page(TEMPLATE, &dataset(), date, at).unwrap();
        assert_eq!(html.matches("class=\"story story-lead\"").count(), 2);
        assert_eq!(html.matches("class=\"story\"").count(), 1);
    }

    #[test]
    fn test_expansion_is_attribute_safe() {
        let mut set = StoryCategorySet::default();
        let mut s = story("Quote");
        s.expansion = Some(Expansion {
            expanded_summary: "He said \"no\" & <left>".to_string(),
            additional_sources: vec!["AP".to_string()],
            related_topics: vec!["it's".to_string()],
        });
        set.insert(Category::National, vec![s]);

        let (date, at) = when();
        let html = render_page("{{NATIONAL}}", &set, date, at).unwrap();
        let start = html.find("data-expansion=\"").unwrap() + "data-expansion=\"".len();
        let attr = &html[start..start + html[start..].find('"').unwrap()];
        assert!(!attr.contains('<'));
        assert!(!attr.contains('\''));

        let decoded = attr
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&");
        let expansion: Expansion = serde_json::from_str(&decoded).unwrap();
        assert_eq!(expansion.expanded_summary, "He said \"no\" & <left>");
    }

    #[test]
    fn test_story_text_is_escaped_and_not_rescanned() {
        let mut set = StoryCategorySet::default();
        set.insert(Category::National, vec![story("<b>{{GAMING}}</b>")]);
        let (date, at) = when();
        let html = render_page("{{NATIONAL}}", &set, date, at).unwrap();
        assert!(html.contains("&lt;b&gt;{{GAMING}}&lt;/b&gt;"));
    }

    #[test]
    fn test_unknown_slot_fails() {
        let (date, at) = when();
        let err = render_page("<p>{{WEATHER}}</p>", &dataset(), date, at).unwrap_err();
        assert!(matches!(err, Error::Render(msg) if msg.contains("WEATHER")));
    }

    #[test]
    fn test_unclosed_slot_fails() {
        let (date, at) = when();
        assert!(render_page("<p>{{NATIONAL</p>", &dataset(), date, at).is_err());
        // A later slot's closing braces do not rescue an unclosed one.
        let err = render_page("<p>{{NATIONAL</p><p>{{GAMING}}</p>", &dataset(), date, at)
            .unwrap_err();
        assert!(matches!(err, Error::Render(msg) if msg.contains("NATIONAL")));
        assert!(render_page("{{NATIONAL }}", &dataset(), date, at).is_err());
    }

    #[test]
    fn test_shipped_template_renders() {
        let template = include_str!("../../../resources/template.html");
        let (date, at) = when();
        let html = render_page(template, &dataset(), date, at).unwrap();
        assert!(html.contains("<title>Impartial News - Friday, March 7, 2025</title>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_slots_are_case_sensitive() {
        let (date, at) = when();
        for template in ["<p>{{Gaming}}</p>", "{{national}}"] {
            let err = render_page(template, &dataset(), date, at).unwrap_err();
            assert!(matches!(err, Error::Render(_)), "{template}");
        }
    }

    #[test]
    fn test_non_identifier_braces_pass_through() {
        let (date, at) = when();
        let template = "a {{ b }} {{#each}} {{\n{{";
        let html = render_page(template, &dataset(), date, at).unwrap();
        assert_eq!(html, template);
    }
}
