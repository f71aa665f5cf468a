//! Server-rendered HTML pages.

use axum::response::Html;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write;

use super::flash::Flash;
use crate::db::{AttemptCounter, User};
use crate::services::GalleryListing;

fn layout(title: &str, flashes: &[Flash], body: &str) -> Html<String> {
    let mut messages = String::new();
    for flash in flashes {
        let _ = write!(
            messages,
            r#"<p class="flash {}">{}</p>"#,
            flash.level.as_str(),
            text(&flash.message)
        );
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<nav><a href="/">Home</a> | <a href="/advancements">Advancements</a> | <a href="/locked_area">Admin</a></nav>
<main>
{messages}
{body}
</main>
</body>
</html>"#,
        title = text(title),
    ))
}

pub fn index(flashes: &[Flash], galleries: &[String], logged_in: bool) -> Html<String> {
    let mut body = String::from("<h1>Advancements</h1>\n<ul>\n");
    body.push_str(r#"<li><a href="/advancements">Latest</a></li>"#);
    for name in galleries {
        let _ = write!(
            body,
            r#"<li><a href="/advancements/{}">{}</a></li>"#,
            attr(&urlencoding::encode(name)),
            text(name)
        );
    }
    body.push_str("</ul>\n");

    if logged_in {
        body.push_str(r#"<p><a href="/locked_area">Go to the admin area</a></p>"#);
    } else {
        body.push_str(
            r#"<h2>Admin login</h2>
<form method="post" action="/locked_login">
<input name="username" placeholder="Username" autocomplete="username">
<input name="password" type="password" placeholder="Password" autocomplete="current-password">
<button type="submit">Log in</button>
</form>"#,
        );
    }

    layout("Advancements", flashes, &body)
}

pub fn gallery(flashes: &[Flash], folder: Option<&str>, listing: &GalleryListing) -> Html<String> {
    let title = folder.unwrap_or("Advancements");
    let prefix = folder.map_or_else(
        || "/uploads".to_string(),
        |f| format!("/uploads/{}", urlencoding::encode(f)),
    );

    let mut body = format!("<h1>{}</h1>\n", text(title));

    if listing.images.is_empty() && listing.texts.is_empty() {
        body.push_str("<p>Nothing here yet.</p>\n");
    }

    if !listing.images.is_empty() {
        body.push_str(r#"<section class="images">"#);
        for image in &listing.images {
            let _ = write!(
                body,
                r#"<img src="{}/{}" alt="{}" loading="lazy">"#,
                attr(&prefix),
                attr(&urlencoding::encode(image)),
                attr(image)
            );
        }
        body.push_str("</section>\n");
    }

    if !listing.texts.is_empty() {
        body.push_str(r#"<section class="texts">"#);
        for note in &listing.texts {
            let _ = write!(body, "<pre>{}</pre>", text(note));
        }
        body.push_str("</section>\n");
    }

    layout(title, flashes, &body)
}

pub struct DashboardView<'a> {
    pub username: &'a str,
    pub users: &'a [User],
    pub user_counters: &'a [(String, AttemptCounter)],
    pub ip_counters: &'a [(String, AttemptCounter)],
    pub galleries: &'a [String],
}

pub fn dashboard(flashes: &[Flash], view: &DashboardView<'_>) -> Html<String> {
    let mut body = format!(
        "<h1>Admin area</h1>\n<p>Logged in as <strong>{}</strong></p>\n\
         <form method=\"post\" action=\"/admin_logout\"><button type=\"submit\">Log out</button></form>\n",
        text(view.username)
    );

    let gallery_options: String = view.galleries.iter().fold(String::new(), |mut acc, g| {
        let _ = write!(acc, r#"<option value="{}">{}</option>"#, attr(g), text(g));
        acc
    });

    let _ = write!(
        body,
        r#"<h2>Upload</h2>
<form method="post" action="/upload_image" enctype="multipart/form-data">
<input name="gallery" list="galleries" placeholder="Gallery (empty for latest)">
<input name="image" type="file" accept=".jpg,.jpeg,.png,.gif">
<button type="submit">Upload image</button>
</form>
<form method="post" action="/upload_text">
<input name="gallery" list="galleries" placeholder="Gallery (empty for latest)">
<textarea name="text" placeholder="Note"></textarea>
<button type="submit">Add note</button>
</form>
<datalist id="galleries">{gallery_options}</datalist>
"#
    );

    body.push_str("<h2>Users</h2>\n<table>\n<tr><th>User</th><th>Created</th><th>Role</th><th></th></tr>\n");
    for user in view.users {
        let created = chrono::DateTime::from_timestamp(user.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let action = if user.owner {
            String::new()
        } else {
            format!(
                r#"<form method="post" action="/admin_delete_user"><input type="hidden" name="username" value="{}"><button type="submit">Delete</button></form>"#,
                attr(&user.username)
            )
        };
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            text(&user.username),
            created,
            if user.owner { "owner" } else { "admin" },
            action
        );
    }
    body.push_str("</table>\n");

    body.push_str(
        r#"<form method="post" action="/admin_create_user">
<input name="new_login" placeholder="Username">
<input name="new_pass" type="password" placeholder="Password">
<button type="submit">Create user</button>
</form>
<form method="post" action="/admin_reset_password">
<input name="username" placeholder="Username">
<input name="new_pass" type="password" placeholder="New password">
<button type="submit">Reset password</button>
</form>
"#,
    );

    body.push_str("<h2>Login attempts</h2>\n");
    for (scope, counters) in [("user", view.user_counters), ("ip", view.ip_counters)] {
        let _ = writeln!(body, "<h3>By {scope}</h3>\n<ul>");
        for (key, counter) in counters {
            let _ = writeln!(
                body,
                r#"<li>{} : {} failed <form method="post" action="/admin_reset_attempts"><input type="hidden" name="key" value="{}"><input type="hidden" name="scope" value="{scope}"><button type="submit">Reset</button></form></li>"#,
                text(key),
                counter.count,
                attr(key)
            );
        }
        body.push_str("</ul>\n");
    }

    layout("Admin area", flashes, &body)
}

pub fn set_credentials(flashes: &[Flash], initial_setup: bool) -> Html<String> {
    let intro = if initial_setup {
        "<p>No account exists yet. The account created here becomes the owner.</p>"
    } else {
        "<p>Adding credentials requires the master key.</p>"
    };
    let master_key_field = if initial_setup {
        ""
    } else {
        r#"<input name="master_key" type="password" placeholder="Master key">"#
    };

    let body = format!(
        r#"<h1>Set credentials</h1>
{intro}
<form method="post" action="/set_credentials">
{master_key_field}
<input name="new_login" placeholder="Username">
<input name="new_pass" type="password" placeholder="Password">
<button type="submit">Save</button>
</form>"#
    );

    layout("Set credentials", flashes, &body)
}
