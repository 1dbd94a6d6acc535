//! Textual resource lists, e.g. `cpus:4;mem:16384;ports:[31000-32000]`
//! or `disk(role, ops):100`. Used by the cluster definition file and tests.

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};
use nom::IResult;

use crate::resources::amount::ResourceAmount;
use crate::resources::set::{Reservation, Resource, ResourceSet, DEFAULT_ROLE};
use crate::resources::value::{RangeSet, ResourceValue};

type NomResult<'a, Ret> = IResult<&'a str, Ret>;

fn p_token(input: &str) -> NomResult<&str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '/' || c == '.')(
        input,
    )
}

fn p_u64(input: &str) -> NomResult<u64> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), str::parse)(input)
}

fn p_amount(input: &str) -> NomResult<ResourceAmount> {
    map_res(
        take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        str::parse,
    )(input)
}

fn p_range(input: &str) -> NomResult<(u64, u64)> {
    map(
        pair(p_u64, opt(preceded(char('-'), p_u64))),
        |(begin, end)| (begin, end.unwrap_or(begin)),
    )(input)
}

fn p_ranges(input: &str) -> NomResult<ResourceValue> {
    let items = separated_list1(spaced(char(',')), p_range);
    map(
        delimited(spaced(char('[')), items, spaced(char(']'))),
        |pairs| ResourceValue::Ranges(RangeSet::new(pairs)),
    )(input)
}

fn p_items(input: &str) -> NomResult<ResourceValue> {
    let items = separated_list1(spaced(char(',')), p_token);
    map(
        delimited(spaced(char('{')), items, spaced(char('}'))),
        |items| ResourceValue::Items(items.into_iter().map(str::to_string).collect()),
    )(input)
}

fn p_value(input: &str) -> NomResult<ResourceValue> {
    alt((p_ranges, p_items, map(p_amount, ResourceValue::Scalar)))(input)
}

// `(role)` or `(role, principal)` after a resource name
fn p_role_spec(input: &str) -> NomResult<(&str, Option<&str>)> {
    delimited(
        spaced(char('(')),
        pair(p_token, opt(preceded(spaced(char(',')), p_token))),
        spaced(char(')')),
    )(input)
}

fn p_resource(input: &str) -> NomResult<Resource> {
    map(
        separated_pair(
            pair(p_token, opt(p_role_spec)),
            spaced(char(':')),
            p_value,
        ),
        |((name, role_spec), value)| {
            let (role, principal) = role_spec.unwrap_or((DEFAULT_ROLE, None));
            Resource {
                name: name.to_string(),
                role: role.to_string(),
                reservation: principal.map(Reservation::new),
                value,
            }
        },
    )(input)
}

fn spaced<'a, O, F>(parser: F) -> impl FnMut(&'a str) -> NomResult<'a, O>
where
    F: FnMut(&'a str) -> NomResult<'a, O>,
{
    delimited(multispace0, parser, multispace0)
}

/// Parses a `;`-separated resource list into a normalized set.
pub fn parse_resource_set(input: &str) -> crate::Result<ResourceSet> {
    let (_, (_, resources, _)) = all_consuming(tuple((
        multispace0,
        separated_list1(spaced(char(';')), p_resource),
        multispace0,
    )))(input)
    .map_err(|e| format!("invalid resource list {input:?}: {e}"))?;
    Ok(ResourceSet::from_resources(resources)?)
}
