//! Relation extractor
//!
//! Best-effort scan of statement text for relation names that follow the
//! `FROM` and `JOIN` keywords. The result only feeds the catalog's table
//! associations: subqueries, CTE names, quoted identifiers, comments and string
//! literals are not understood, and that is acceptable here.

use std::collections::BTreeSet;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::multispace1,
    sequence::{pair, preceded},
    IResult,
};

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_relation_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// `FROM <name>` or `JOIN <name>`, keyword matched case-insensitively
fn relation_ref(input: &str) -> IResult<&str, &str> {
    preceded(
        pair(
            alt((tag_no_case("from"), tag_no_case("join"))),
            multispace1,
        ),
        take_while1(is_relation_char),
    )(input)
}

/// Extract the distinct relation names referenced by `sql`, sorted.
///
/// Never fails; returns an empty set when nothing matches.
pub fn extract_relations(sql: &str) -> BTreeSet<String> {
    let mut relations = BTreeSet::new();
    let mut rest = sql;
    let mut prev: Option<char> = None;

    while !rest.is_empty() {
        // keywords only start on a word boundary
        if !prev.is_some_and(is_word_char) {
            if let Ok((remaining, name)) = relation_ref(rest) {
                relations.insert(name.to_string());
                prev = name.chars().last();
                rest = remaining;
                continue;
            }
        }

        let mut chars = rest.chars();
        prev = chars.next();
        rest = chars.as_str();
    }

    relations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(sql: &str) -> Vec<String> {
        extract_relations(sql).into_iter().collect()
    }

    #[test]
    fn test_from_and_join() {
        assert_eq!(
            names("SELECT a.name FROM actor a JOIN cast_info ci ON ci.person_id = a.id"),
            vec!["actor", "cast_info"]
        );
    }

    #[test]
    fn test_case_insensitive_and_whitespace() {
        assert_eq!(names("select *\nfrom\n\tTitle left join\r\nmovie_info"), vec![
            "Title",
            "movie_info"
        ]);
    }

    #[test]
    fn test_schema_qualified_and_duplicates() {
        assert_eq!(
            names("SELECT * FROM imdb.title t JOIN imdb.title t2 ON t.id = t2.id"),
            vec!["imdb.title"]
        );
    }

    #[test]
    fn test_word_boundary() {
        // `datefrom` and `rejoin` are identifiers, not keywords
        assert!(names("SELECT datefrom x, rejoin y").is_empty());
        assert_eq!(names("SELECT 1 AS x FROM t_from"), vec!["t_from"]);
    }

    #[test]
    fn test_no_matches() {
        assert!(extract_relations("SELECT 1").is_empty());
        assert!(extract_relations("").is_empty());
        // subqueries are not followed
        assert_eq!(names("SELECT * FROM (SELECT * FROM actor) s"), vec!["actor"]);
    }
}
