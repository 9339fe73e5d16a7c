//! Email subjects and HTML bodies.
//!
//! User-supplied text is escaped before it is placed in a body.

use crate::config::FunctionsConfig;
use crate::models::{EmailMessage, Howto, MapPin, Message, User};

pub const HOW_TO_SUBMISSION_SUBJECT: &str = "Your how-to has been submitted";
pub const MAP_PIN_SUBMISSION_SUBJECT: &str = "Your map pin has been submitted";
pub const MESSAGE_RECEIVER_SUBJECT: &str = "Someone sent you a message";
pub const MESSAGE_SENDER_SUBJECT: &str = "Your message has been sent";

pub const SIGNOFF: &str = "<p>Cheers,<br />The Community Team</p>";

pub fn howto_submission_email(
    user: &User,
    howto: &Howto,
    config: &FunctionsConfig,
) -> EmailMessage {
    let slug = howto.slug.as_deref().unwrap_or(&howto.id);
    let link = config.site_link(&format!("how-to/{slug}"));
    let body = format!(
        "<p>Your how-to <a href=\"{link}\">{title}</a> has been submitted.</p>\
         <p>It is now awaiting moderation. We will let you know once it has been reviewed.</p>",
        link = escape_html(&link),
        title = escape_html(&howto.title),
    );
    EmailMessage {
        subject: HOW_TO_SUBMISSION_SUBJECT.to_string(),
        html: layout(user, &body),
    }
}

pub fn map_pin_submission_email(
    user: &User,
    pin: &MapPin,
    config: &FunctionsConfig,
) -> EmailMessage {
    let link = config.site_link(&format!("map#{}", pin.id));
    let body = format!(
        "<p>Your map pin has been submitted.</p>\
         <p>It is now awaiting moderation and will appear on the \
         <a href=\"{link}\">map</a> once approved.</p>",
        link = escape_html(&link),
    );
    EmailMessage {
        subject: MAP_PIN_SUBMISSION_SUBJECT.to_string(),
        html: layout(user, &body),
    }
}

/// Notice to the receiver of a direct message.
pub fn receiver_message_email(
    receiver: &User,
    message: &Message,
    config: &FunctionsConfig,
) -> EmailMessage {
    let settings = config.site_link("settings");
    let body = format!(
        "<p>{sender} sent you a message:</p>\
         <blockquote>{text}</blockquote>\
         <p>Reply to this email to answer them directly.</p>\
         <p>You can stop receiving messages in your <a href=\"{settings}\">settings</a>.</p>",
        sender = escape_html(&message.email),
        text = escape_html(&message.text),
        settings = escape_html(&settings),
    );
    EmailMessage {
        subject: MESSAGE_RECEIVER_SUBJECT.to_string(),
        html: layout(receiver, &body),
    }
}

/// Confirmation to the sender of a direct message.
pub fn sender_message_email(
    receiver: &User,
    message: &Message,
    config: &FunctionsConfig,
) -> EmailMessage {
    let profile = config.site_link(&format!("u/{}", receiver.id));
    let body = format!(
        "<p>Hey there,</p>\
         <p>Your message to <a href=\"{profile}\">{receiver}</a> has been sent:</p>\
         <blockquote>{text}</blockquote>\
         <p>They will reply to {email} if they want to get in touch.</p>",
        profile = escape_html(&profile),
        receiver = escape_html(receiver.greeting_name()),
        text = escape_html(&message.text),
        email = escape_html(&message.email),
    );
    EmailMessage {
        subject: MESSAGE_SENDER_SUBJECT.to_string(),
        html: format!("{body}{SIGNOFF}"),
    }
}

fn layout(user: &User, body: &str) -> String {
    format!(
        "<p>Hey {name},</p>{body}{SIGNOFF}",
        name = escape_html(user.greeting_name())
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
