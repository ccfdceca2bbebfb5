//! Biographical facts from a person's page.
//!
//! Most biographies open with an infobox table carrying the name, a
//! portrait and "Born"/"Died" rows. Pages without one usually start with
//! `<b>Name</b> (birth date – death date)`, which is read instead.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use super::dates::parse_date;
use super::html::{collapse_whitespace, find_element, find_outermost, has_class, inside, is_tag, plain_text};
use crate::error::{DateError, ExtractError, ExtractResult};
use crate::types::date::Date;
use crate::types::figure::FigureImage;

/// Elements whose text never belongs to a name.
const NAME_PRUNE: &[&str] = &["sup", "style", "script"];

static BORN_DIED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\(([^()]+)\u{2013}([^()]+)\)").expect("born-died pattern")
});

/// Facts read from a person page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFacts {
    /// Canonical name when the page states one
    pub full_name: Option<String>,
    pub image: Option<FigureImage>,
    pub born: Date,
    pub died: Date,
}

/// Extract facts from a person page whose title is `title`.
///
/// Uses the infobox when there is one and the intro paragraphs otherwise.
/// Both dates are required.
pub fn extract_person(html: &str, title: &str) -> ExtractResult<PersonFacts> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let facts = match find_infobox(root) {
        Some(infobox) => from_infobox(infobox)?,
        None => from_intro(root, title)?,
    };

    if facts.died < facts.born {
        return Err(ExtractError::Invalid {
            reason: format!("died {} before born {}", facts.died, facts.born),
        });
    }
    Ok(facts)
}

fn find_infobox(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    find_element(root, |el| is_tag(el, "table") && has_class(el, "infobox"))
}

fn from_infobox(infobox: ElementRef<'_>) -> ExtractResult<PersonFacts> {
    Ok(PersonFacts {
        full_name: full_name(infobox),
        image: infobox_image(infobox),
        born: date_row(infobox, "Born")?,
        died: date_row(infobox, "Died")?,
    })
}

/// Text of the first `fn` element, citations and template styles removed.
pub fn full_name(infobox: ElementRef<'_>) -> Option<String> {
    let el = find_element(infobox, |el| has_class(el, "fn"))?;
    let name = collapse_whitespace(&plain_text(el, NAME_PRUNE));
    (!name.is_empty()).then_some(name)
}

/// The portrait: the first image before the second row header.
///
/// Images further down the table are flags and icons, not portraits.
pub fn infobox_image(infobox: ElementRef<'_>) -> Option<FigureImage> {
    let mut headers = 0;
    let el = find_element(infobox, |el| {
        if is_tag(el, "th") {
            headers += 1;
        }
        headers < 2 && is_tag(el, "img")
    })?;
    image_of(el)
}

/// Parse the cell next to the row header reading `label`.
fn date_row(infobox: ElementRef<'_>, label: &str) -> ExtractResult<Date> {
    let mut last_error: Option<DateError> = None;
    for th in find_outermost(infobox, |el| is_tag(el, "th")) {
        if collapse_whitespace(&plain_text(th, NAME_PRUNE)) != label {
            continue;
        }
        let Some(td) = th
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|el| is_tag(*el, "td"))
        else {
            continue;
        };
        match parse_date(&plain_text(td, &["style", "script"])) {
            Ok(date) => return Ok(date),
            Err(e) => last_error = Some(e),
        }
    }
    match last_error {
        Some(e) => Err(e.into()),
        None => Err(ExtractError::not_found(format!("{} row", label))),
    }
}

fn from_intro(root: ElementRef<'_>, title: &str) -> ExtractResult<PersonFacts> {
    let section = find_element(root, |el| is_tag(el, "section"))
        .or_else(|| {
            find_element(root, |el| is_tag(el, "div") && has_class(el, "mw-parser-output"))
        })
        .ok_or_else(|| ExtractError::not_found("infobox or content section"))?;

    let title = collapse_whitespace(title);
    let paragraphs = section
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| is_tag(*el, "p"))
        .filter(|p| !plain_text(*p, &[]).trim().is_empty())
        .take(2);

    let mut last_error: Option<DateError> = None;
    for p in paragraphs {
        let Some(bold) = find_element(p, |el| is_tag(el, "b")) else {
            continue;
        };
        let name = collapse_whitespace(&plain_text(bold, NAME_PRUNE));
        if name != title {
            continue;
        }

        let mut rest = String::new();
        for node in bold.next_siblings() {
            if let Some(el) = ElementRef::wrap(node) {
                rest.push_str(&plain_text(el, &[]));
            } else if let Some(text) = node.value().as_text() {
                rest.push_str(text);
            }
        }
        let Some(caps) = BORN_DIED.captures(&rest) else {
            continue;
        };

        let dates = parse_date(&caps[1]).and_then(|born| Ok((born, parse_date(&caps[2])?)));
        match dates {
            Ok((born, died)) => {
                return Ok(PersonFacts {
                    full_name: Some(name),
                    image: section_image(section),
                    born,
                    died,
                })
            }
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Err(ExtractError::not_found("intro birth and death dates")),
    }
}

/// First figure in the section that is not part of a table.
fn section_image(section: ElementRef<'_>) -> Option<FigureImage> {
    let figure = find_element(section, |el| {
        is_tag(el, "figure") && !inside(el, "table", section)
    })?;
    let img = find_element(figure, |el| is_tag(el, "img"))?;
    let mut image = image_of(img)?;
    if let Some(caption) = find_element(figure, |el| is_tag(el, "figcaption")) {
        let caption = collapse_whitespace(&plain_text(caption, NAME_PRUNE));
        if !caption.is_empty() {
            image.alt = Some(caption);
        }
    }
    Some(image)
}

fn image_of(img: ElementRef<'_>) -> Option<FigureImage> {
    let src = img.value().attr("src").filter(|s| !s.is_empty())?;
    Some(FigureImage {
        src: src.to_string(),
        alt: img
            .value()
            .attr("alt")
            .filter(|a| !a.is_empty())
            .map(str::to_string),
    })
}
