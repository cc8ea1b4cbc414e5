use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::memberships::Membership;
use crate::messages::Message;
use crate::people::Person;
use crate::rooms::Room;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), OutputError> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub fn print_rooms(rooms: &[Room], json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(rooms);
    }
    print!("{}", render_rooms(rooms, Utc::now()));
    Ok(())
}

pub fn print_messages(messages: &[Message], json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(messages);
    }
    print!("{}", render_messages(messages, Utc::now()));
    Ok(())
}

pub fn print_people(people: &[Person], json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(people);
    }
    print!("{}", render_people(people));
    Ok(())
}

pub fn print_memberships(memberships: &[Membership], json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(memberships);
    }
    print!("{}", render_memberships(memberships));
    Ok(())
}

pub fn print_room(room: &Room, json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(room);
    }
    println!("Room {}", or_dash(room.id.as_deref()));
    println!("title: {}", or_dash(room.title.as_deref()));
    println!("type: {}", or_dash(room.room_type.as_deref()));
    println!("locked: {}", room.is_locked.unwrap_or(false));
    println!("last activity: {}", or_dash(room.last_activity.as_deref()));
    println!("created: {}", or_dash(room.created.as_deref()));
    Ok(())
}

pub fn print_message(message: &Message, json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(message);
    }
    println!("Message {} (room {})", or_dash(message.id.as_deref()), or_dash(message.room_id.as_deref()));
    println!("from: {}", or_dash(message.person_email.as_deref()));
    println!(
        "when: {} ({})",
        format_relative_date(message.created.as_deref(), Utc::now()),
        or_dash(message.created.as_deref())
    );
    println!("text: {}", message.text.as_deref().map(str::trim).filter(|text| !text.is_empty()).unwrap_or("<non-text>"));
    if message.files.is_empty() {
        println!("files: -");
    } else {
        println!("files:");
        for file in &message.files {
            println!("  - {file}");
        }
    }
    Ok(())
}

pub fn print_person(person: &Person, json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(person);
    }
    println!("Person {}", or_dash(person.id.as_deref()));
    println!("name: {}", or_dash(person.display_name.as_deref()));
    println!("emails: {}", if person.emails.is_empty() { "-".to_string() } else { person.emails.join(", ") });
    println!("avatar: {}", or_dash(person.avatar.as_deref()));
    println!("created: {}", or_dash(person.created.as_deref()));
    Ok(())
}

pub fn print_membership(membership: &Membership, json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(membership);
    }
    println!("Membership {}", or_dash(membership.id.as_deref()));
    println!("room: {}", or_dash(membership.room_id.as_deref()));
    println!(
        "person: {} ({})",
        or_dash(membership.person_email.as_deref()),
        or_dash(membership.person_id.as_deref())
    );
    println!("moderator: {}", membership.is_moderator.unwrap_or(false));
    println!("monitor: {}", membership.is_monitor.unwrap_or(false));
    println!("created: {}", or_dash(membership.created.as_deref()));
    Ok(())
}

/// Prints only the id of a created entity, so it can be captured by a shell.
pub fn print_created<T: Serialize>(value: &T, id: Option<&str>, json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(value);
    }
    println!("{}", id.unwrap_or_default());
    Ok(())
}

pub fn render_rooms(rooms: &[Room], now: DateTime<Utc>) -> String {
    let mut id_width = display_width("id");
    let mut title_width = display_width("title");
    let mut rows = Vec::with_capacity(rooms.len());
    for room in rooms {
        let id = room.id.clone().unwrap_or_default();
        let title = room.title.clone().unwrap_or_default();
        let activity = format_relative_date(room.last_activity.as_deref(), now);
        id_width = id_width.max(display_width(&id));
        title_width = title_width.max(display_width(&title));
        rows.push((id, title, activity));
    }
    title_width = title_width.min(48);

    let mut out = format!(
        "{}  {}  {}\n",
        pad_right("id", id_width),
        pad_right("title", title_width),
        "active"
    );
    for (id, title, activity) in rows {
        out.push_str(&format!(
            "{}  {}  {}\n",
            pad_right(&id, id_width),
            pad_right(&truncate_display(&title, title_width), title_width),
            activity
        ));
    }
    out
}

pub fn render_messages(messages: &[Message], now: DateTime<Utc>) -> String {
    let mut when_width = display_width("when");
    let mut from_width = display_width("from");
    let mut rows = Vec::with_capacity(messages.len());
    for message in messages {
        let when = format_relative_date(message.created.as_deref(), now);
        let from = message.person_email.clone().unwrap_or_default();
        let text = message_preview(message);
        when_width = when_width.max(display_width(&when));
        from_width = from_width.max(display_width(&from));
        rows.push((when, from, text));
    }
    when_width = when_width.min(10);
    from_width = from_width.min(32);

    let mut out = format!(
        "{}  {}  {}\n",
        pad_right("when", when_width),
        pad_right("from", from_width),
        "text"
    );
    for (when, from, text) in rows {
        out.push_str(&format!(
            "{}  {}  {}\n",
            pad_right(&when, when_width),
            pad_right(&truncate_display(&from, from_width), from_width),
            truncate_display(&text, 72)
        ));
    }
    out
}

pub fn render_people(people: &[Person]) -> String {
    let mut name_width = display_width("name");
    for person in people {
        name_width = name_width.max(display_width(person.display_name.as_deref().unwrap_or_default()));
    }
    name_width = name_width.min(32);

    let mut out = format!("{}  {}\n", pad_right("name", name_width), "email");
    for person in people {
        let name = person.display_name.as_deref().unwrap_or_default();
        out.push_str(&format!(
            "{}  {}\n",
            pad_right(&truncate_display(name, name_width), name_width),
            person.primary_email().unwrap_or("-")
        ));
    }
    out
}

pub fn render_memberships(memberships: &[Membership]) -> String {
    let mut email_width = display_width("email");
    for membership in memberships {
        email_width = email_width.max(display_width(membership.person_email.as_deref().unwrap_or_default()));
    }
    email_width = email_width.min(40);

    let mut out = format!("{}  {}  {}\n", pad_right("email", email_width), pad_right("mod", 3), "room");
    for membership in memberships {
        let moderator = if membership.is_moderator.unwrap_or(false) { "yes" } else { "no" };
        out.push_str(&format!(
            "{}  {}  {}\n",
            pad_right(
                &truncate_display(membership.person_email.as_deref().unwrap_or_default(), email_width),
                email_width
            ),
            pad_right(moderator, 3),
            membership.room_id.as_deref().unwrap_or("-")
        ));
    }
    out
}

fn message_preview(message: &Message) -> String {
    let text = message
        .text
        .as_deref()
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    match (text.is_empty(), message.files.len()) {
        (true, 0) => "<non-text>".to_string(),
        (true, files) => format!("[{files} file(s)]"),
        (false, 0) => text,
        (false, files) => format!("{text} [{files} file(s)]"),
    }
}

/// Accepts the RFC 3339 timestamps the service returns.
pub fn format_relative_date(timestamp: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(parsed) = timestamp.and_then(|value| DateTime::parse_from_rfc3339(value).ok()) else {
        return "-".to_string();
    };
    let seconds = now.signed_duration_since(parsed.with_timezone(&Utc)).num_seconds();
    let (delta, future) = if seconds < 0 { (-seconds, true) } else { (seconds, false) };
    if delta < 10 {
        return "now".to_string();
    }
    if delta < 60 {
        return format_relative_unit(delta, "s", future);
    }
    let minutes = delta / 60;
    if minutes < 60 {
        return format_relative_unit(minutes, "m", future);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format_relative_unit(hours, "h", future);
    }
    let days = hours / 24;
    if days < 7 {
        return format_relative_unit(days, "d", future);
    }
    let weeks = days / 7;
    if weeks < 4 {
        return format_relative_unit(weeks, "w", future);
    }
    let months = days / 30;
    if months < 12 {
        return format_relative_unit(months, "mo", future);
    }
    format_relative_unit(days / 365, "y", future)
}

fn format_relative_unit(value: i64, unit: &str, future: bool) -> String {
    if future {
        format!("in {value}{unit}")
    } else {
        format!("{value}{unit} ago")
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|value| !value.is_empty()).unwrap_or("-")
}

fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

fn truncate_display(value: &str, max_width: usize) -> String {
    if display_width(value) <= max_width {
        return value.to_string();
    }
    let ellipsis = "...";
    let mut width = 0usize;
    let mut output = String::new();
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + ellipsis.len() > max_width {
            break;
        }
        output.push(ch);
        width += ch_width;
    }
    output.push_str(ellipsis);
    output
}

fn pad_right(value: &str, width: usize) -> String {
    let mut output = value.to_string();
    let current = display_width(value);
    if current < width {
        output.push_str(&" ".repeat(width - current));
    }
    output
}
