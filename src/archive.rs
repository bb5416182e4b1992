//! Anki .apkg archive builder.
//!
//! An .apkg is a zip holding a SQLite collection (`collection.anki2`),
//! numbered media entries, and a `media` JSON file mapping those numbers
//! back to filenames. The collection carries one deck and one two-field
//! Basic model; ids are derived from the deck name so repeated builds of
//! the same deck line up.

use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Fixed model id for the Basic front/back model.
const MODEL_ID: i64 = 1_607_392_319_000;

/// Builds one deck archive. Reused strictly sequentially across batches —
/// one builder per output file.
pub struct ApkgBuilder {
    deck_name: String,
    deck_id: i64,
    media: Vec<(String, Vec<u8>)>,
    cards: Vec<(String, String)>,
}

impl ApkgBuilder {
    pub fn new(deck_name: &str) -> Self {
        Self {
            deck_name: deck_name.to_string(),
            deck_id: stable_id(deck_name),
            media: Vec::new(),
            cards: Vec::new(),
        }
    }

    /// Attach a media file by name. Names must match the `[sound:...]` and
    /// `<img src=...>` references in card HTML.
    pub fn add_media(&mut self, filename: &str, bytes: Vec<u8>) {
        self.media.push((filename.to_string(), bytes));
    }

    /// Add one card: plain front text and back HTML.
    pub fn add_card(&mut self, front: &str, back_html: &str) {
        self.cards.push((front.to_string(), back_html.to_string()));
    }

    /// Assemble the archive and return its bytes.
    pub fn save(&self) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().context("create scratch dir for collection")?;
        let db_path = scratch.path().join("collection.anki2");

        self.write_collection(&db_path)?;
        let db_bytes = std::fs::read(&db_path).context("read built collection")?;

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options =
                FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            zip.start_file("collection.anki2", options)
                .context("zip collection entry")?;
            zip.write_all(&db_bytes).context("zip collection bytes")?;

            let mut media_map = serde_json::Map::new();
            for (i, (name, bytes)) in self.media.iter().enumerate() {
                let entry = i.to_string();
                zip.start_file(&entry, options)
                    .with_context(|| format!("zip media entry {entry}"))?;
                zip.write_all(bytes)
                    .with_context(|| format!("zip media bytes for {name}"))?;
                media_map.insert(entry, json!(name));
            }

            zip.start_file("media", options).context("zip media map")?;
            zip.write_all(serde_json::Value::Object(media_map).to_string().as_bytes())
                .context("zip media map bytes")?;

            zip.finish().context("finalize zip")?;
        }
        Ok(buffer.into_inner())
    }

    fn write_collection(&self, db_path: &std::path::Path) -> Result<()> {
        let conn = Connection::open(db_path).context("open collection db")?;
        conn.execute_batch(SCHEMA).context("create schema")?;

        let now = Utc::now().timestamp();
        let now_ms = now * 1000;

        let model = json!({
                "id": MODEL_ID,
                "name": "Basic (deckforge)",
                "type": 0,
                "mod": now,
                "usn": -1,
                "sortf": 0,
                "did": self.deck_id,
                "vers": [],
                "tags": [],
                "flds": [
                    { "name": "Front", "ord": 0, "sticky": false, "rtl": false,
                      "font": "Arial", "size": 20, "media": [] },
                    { "name": "Back", "ord": 1, "sticky": false, "rtl": false,
                      "font": "Arial", "size": 20, "media": [] }
                ],
                "tmpls": [
                    { "name": "Card 1", "ord": 0,
                      "qfmt": "{{Front}}",
                      "afmt": "{{FrontSide}}<hr id=\"answer\">{{Back}}",
                      "bqfmt": "", "bafmt": "", "did": null }
                ],
                "css": ".card { font-family: arial; font-size: 20px; text-align: center; color: black; background-color: white; }",
                "latexPre": "\\documentclass[12pt]{article}\n\\begin{document}\n",
                "latexPost": "\\end{document}",
                "req": [[0, "all", [0]]]
        });
        let mut models = serde_json::Map::new();
        models.insert(MODEL_ID.to_string(), model);
        let models = serde_json::Value::Object(models);

        let mut decks = serde_json::Map::new();
        decks.insert(
            "1".to_string(),
            json!({
                "id": 1, "name": "Default", "desc": "", "mod": now, "usn": -1,
                "collapsed": false, "dyn": 0, "conf": 1, "extendNew": 10,
                "extendRev": 50, "newToday": [0, 0], "revToday": [0, 0],
                "lrnToday": [0, 0], "timeToday": [0, 0]
            }),
        );
        decks.insert(
            self.deck_id.to_string(),
            json!({
                "id": self.deck_id, "name": self.deck_name, "desc": "", "mod": now,
                "usn": -1, "collapsed": false, "dyn": 0, "conf": 1, "extendNew": 10,
                "extendRev": 50, "newToday": [0, 0], "revToday": [0, 0],
                "lrnToday": [0, 0], "timeToday": [0, 0]
            }),
        );
        let decks = serde_json::Value::Object(decks);

        let conf = json!({
            "curDeck": self.deck_id, "activeDecks": [self.deck_id], "newSpread": 0,
            "collapseTime": 1200, "timeLim": 0, "estTimes": true, "dueCounts": true,
            "curModel": MODEL_ID.to_string(), "nextPos": 1, "sortType": "noteFld",
            "sortBackwards": false, "addToCur": true
        });

        let dconf = json!({
            "1": {
                "id": 1, "name": "Default", "mod": 0, "usn": 0, "maxTaken": 60,
                "autoplay": true, "timer": 0, "replayq": true,
                "new": { "delays": [1, 10], "ints": [1, 4, 7], "initialFactor": 2500,
                         "order": 1, "perDay": 20, "bury": true, "separate": true },
                "rev": { "perDay": 100, "ease4": 1.3, "fuzz": 0.05, "ivlFct": 1.0,
                         "maxIvl": 36500, "bury": true, "minSpace": 1 },
                "lapse": { "delays": [10], "leechAction": 0, "leechFails": 8,
                           "minInt": 1, "mult": 0.0 }
            }
        });

        conn.execute(
            "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
             VALUES (1, ?1, ?2, ?2, 11, 0, 0, 0, ?3, ?4, ?5, ?6, '{}')",
            rusqlite::params![
                now,
                now_ms,
                conf.to_string(),
                models.to_string(),
                decks.to_string(),
                dconf.to_string(),
            ],
        )
        .context("insert col row")?;

        for (ord, (front, back)) in self.cards.iter().enumerate() {
            let note_id = self.deck_id + ord as i64 + 1;
            let card_id = note_id + 1_000_000;
            let fields = format!("{front}\u{1f}{back}");
            let guid = naming_guid(front, back);
            let csum = field_checksum(front);

            conn.execute(
                "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                 VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
                rusqlite::params![note_id, guid, MODEL_ID, now, fields, front, csum],
            )
            .context("insert note")?;

            conn.execute(
                "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl,
                                    factor, reps, lapses, left, odue, odid, flags, data)
                 VALUES (?1, ?2, ?3, 0, ?4, -1, 0, 0, ?5, 0, 0, 0, 0, 0, 0, 0, 0, '')",
                rusqlite::params![card_id, note_id, self.deck_id, now, ord as i64 + 1],
            )
            .context("insert card")?;
        }

        Ok(())
    }
}

/// Positive 63-bit id derived from a name, stable across runs. Avoids 1,
/// which is the default deck.
fn stable_id(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    let id = (i64::from_be_bytes(raw) & i64::MAX) % 1_000_000_000_000;
    id.max(2)
}

fn naming_guid(front: &str, back: &str) -> String {
    let digest = Sha256::digest(format!("{front}\u{1f}{back}").as_bytes());
    hex::encode(&digest[..5])
}

/// Duplicate-detection checksum over the sort field; Anki only uses it for
/// dedupe hints, so the exact digest family does not matter.
fn field_checksum(field: &str) -> i64 {
    let digest = Sha256::digest(field.as_bytes());
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&digest[..4]);
    u32::from_be_bytes(raw) as i64
}

const SCHEMA: &str = r#"
CREATE TABLE col (
    id integer PRIMARY KEY,
    crt integer NOT NULL,
    mod integer NOT NULL,
    scm integer NOT NULL,
    ver integer NOT NULL,
    dty integer NOT NULL,
    usn integer NOT NULL,
    ls integer NOT NULL,
    conf text NOT NULL,
    models text NOT NULL,
    decks text NOT NULL,
    dconf text NOT NULL,
    tags text NOT NULL
);
CREATE TABLE notes (
    id integer PRIMARY KEY,
    guid text NOT NULL,
    mid integer NOT NULL,
    mod integer NOT NULL,
    usn integer NOT NULL,
    tags text NOT NULL,
    flds text NOT NULL,
    sfld text NOT NULL,
    csum integer NOT NULL,
    flags integer NOT NULL,
    data text NOT NULL
);
CREATE TABLE cards (
    id integer PRIMARY KEY,
    nid integer NOT NULL,
    did integer NOT NULL,
    ord integer NOT NULL,
    mod integer NOT NULL,
    usn integer NOT NULL,
    type integer NOT NULL,
    queue integer NOT NULL,
    due integer NOT NULL,
    ivl integer NOT NULL,
    factor integer NOT NULL,
    reps integer NOT NULL,
    lapses integer NOT NULL,
    left integer NOT NULL,
    odue integer NOT NULL,
    odid integer NOT NULL,
    flags integer NOT NULL,
    data text NOT NULL
);
CREATE TABLE revlog (
    id integer PRIMARY KEY,
    cid integer NOT NULL,
    usn integer NOT NULL,
    ease integer NOT NULL,
    ivl integer NOT NULL,
    lastIvl integer NOT NULL,
    factor integer NOT NULL,
    time integer NOT NULL,
    type integer NOT NULL
);
CREATE TABLE graves (
    usn integer NOT NULL,
    oid integer NOT NULL,
    type integer NOT NULL
);
CREATE INDEX ix_notes_usn ON notes (usn);
CREATE INDEX ix_cards_usn ON cards (usn);
CREATE INDEX ix_revlog_usn ON revlog (usn);
CREATE INDEX ix_cards_nid ON cards (nid);
CREATE INDEX ix_cards_sched ON cards (did, queue, due);
CREATE INDEX ix_revlog_cid ON revlog (cid);
CREATE INDEX ix_notes_csum ON notes (csum);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_stable_id_is_deterministic_and_positive() {
        let a = stable_id("German A1");
        let b = stable_id("German A1");
        assert_eq!(a, b);
        assert!(a >= 2);
        assert_ne!(stable_id("German A1"), stable_id("German A2"));
    }

    #[test]
    fn test_archive_contains_collection_media_and_map() {
        let mut builder = ApkgBuilder::new("Test Deck");
        builder.add_media("001-cat.mp3", vec![1, 2, 3]);
        builder.add_media("001-cat.jpg", vec![4, 5, 6]);
        builder.add_card("the cat", "die Katze [sound:001-cat.mp3]");

        let bytes = builder.save().unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"collection.anki2".to_string()));
        assert!(names.contains(&"0".to_string()));
        assert!(names.contains(&"1".to_string()));
        assert!(names.contains(&"media".to_string()));

        let mut media_json = String::new();
        zip.by_name("media")
            .unwrap()
            .read_to_string(&mut media_json)
            .unwrap();
        let map: serde_json::Value = serde_json::from_str(&media_json).unwrap();
        assert_eq!(map["0"], "001-cat.mp3");
        assert_eq!(map["1"], "001-cat.jpg");
    }

    #[test]
    fn test_collection_has_notes_and_cards() {
        let mut builder = ApkgBuilder::new("Counts");
        builder.add_card("a", "b");
        builder.add_card("c", "d");

        let bytes = builder.save().unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut db_bytes = Vec::new();
        zip.by_name("collection.anki2")
            .unwrap()
            .read_to_end(&mut db_bytes)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("collection.anki2");
        std::fs::write(&db_path, db_bytes).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let notes: i64 = conn
            .query_row("SELECT count(*) FROM notes", [], |r| r.get(0))
            .unwrap();
        let cards: i64 = conn
            .query_row("SELECT count(*) FROM cards", [], |r| r.get(0))
            .unwrap();
        assert_eq!(notes, 2);
        assert_eq!(cards, 2);
    }
}
