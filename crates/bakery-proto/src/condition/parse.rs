//! Nom-based condition tokenizer.

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{multispace0, multispace1},
    combinator::{all_consuming, opt},
    multi::many0,
    sequence::{preceded, terminated, tuple},
};

use super::{Condition, IS_AUTHENTICATED_USER, IS_MEMBER_OF, is_valid_domain};
use crate::error::ConditionError;

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

/// `verb (SP+ arg)* SP*`
fn tokens(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    all_consuming(terminated(
        tuple((token, many0(preceded(multispace1, token)))),
        opt(multispace0),
    ))(input)
}

/// Split a trailing `@domain` token from the argument list.
fn split_domain<'a>(args: &[&'a str]) -> Result<(Vec<&'a str>, Option<String>), ConditionError> {
    let (plain, domain) = match args.split_last() {
        Some((last, rest)) if last.starts_with('@') => (rest, Some(&last[1..])),
        _ => (args, None),
    };
    if plain.iter().any(|a| a.starts_with('@')) {
        return Err(ConditionError::NotRecognized);
    }
    let domain = match domain {
        Some(d) if is_valid_domain(d) => Some(d.to_string()),
        Some(d) => return Err(ConditionError::InvalidDomain(d.to_string())),
        None => None,
    };
    Ok((plain.to_vec(), domain))
}

pub(super) fn parse_condition(input: &str) -> Result<Condition, ConditionError> {
    if input.is_empty() {
        return Err(ConditionError::Parse {
            condition: String::new(),
            reason: "empty caveat",
        });
    }
    if input.starts_with(' ') {
        return Err(ConditionError::Parse {
            condition: input.to_string(),
            reason: "caveat starts with space character",
        });
    }
    let (verb, args) = match tokens(input) {
        Ok((_, parsed)) => parsed,
        Err(_) => {
            return Err(ConditionError::Parse {
                condition: input.to_string(),
                reason: "caveat starts with whitespace",
            });
        }
    };

    match verb {
        IS_AUTHENTICATED_USER => {
            let (plain, domain) = split_domain(&args)?;
            if !plain.is_empty() {
                return Err(ConditionError::NotRecognized);
            }
            Ok(Condition::IsAuthenticatedUser { domain })
        }
        IS_MEMBER_OF => {
            let (groups, domain) = split_domain(&args)?;
            if groups.is_empty() {
                return Err(ConditionError::NotRecognized);
            }
            Ok(Condition::IsMemberOf {
                groups: groups.into_iter().map(String::from).collect(),
                domain,
            })
        }
        _ => Err(ConditionError::NotRecognized),
    }
}
