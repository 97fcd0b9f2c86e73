use once_cell::sync::Lazy;
use regex::Regex;

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*(\d+(?:\.\d{1,2})?)").expect("valid price regex"));

const RANGE_DELIMITERS: [&str; 4] = ["-", "–", "—", "to"];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TicketPrices {
    pub ticket: Option<f64>,
    pub advance: Option<f64>,
    pub door: Option<f64>,
}

/// Pull ticket prices out of free text.
///
/// `$10` is both ticket and door price, `$10-$15` is advance and door,
/// `$10 adv / $15 dos` is ticket then door.
pub fn parse_ticket_prices(text: &str) -> TicketPrices {
    let amounts: Vec<(usize, usize, f64)> = PRICE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let amount = caps.get(1)?.as_str().parse().ok()?;
            Some((whole.start(), whole.end(), amount))
        })
        .collect();

    match amounts.as_slice() {
        [] => TicketPrices::default(),
        [(_, _, only)] => TicketPrices {
            ticket: Some(*only),
            advance: None,
            door: Some(*only),
        },
        [(_, first_end, first), (second_start, _, second), ..] => {
            let between = text[*first_end..*second_start].trim();
            if RANGE_DELIMITERS
                .iter()
                .any(|d| between.eq_ignore_ascii_case(d))
            {
                TicketPrices {
                    ticket: None,
                    advance: Some(*first),
                    door: Some(*second),
                }
            } else {
                TicketPrices {
                    ticket: Some(*first),
                    advance: None,
                    door: Some(*second),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_advance_and_door() {
        let prices = parse_ticket_prices("$10-$15");
        assert_eq!(prices.advance, Some(10.0));
        assert_eq!(prices.door, Some(15.0));
        assert_eq!(prices.ticket, None);

        let spaced = parse_ticket_prices("Tickets: $12 – $18");
        assert_eq!(spaced.advance, Some(12.0));
        assert_eq!(spaced.door, Some(18.0));
    }

    #[test]
    fn test_single_price_is_ticket_and_door() {
        let prices = parse_ticket_prices("$10");
        assert_eq!(prices.ticket, Some(10.0));
        assert_eq!(prices.door, Some(10.0));
        assert_eq!(prices.advance, None);
    }

    #[test]
    fn test_no_price() {
        assert_eq!(parse_ticket_prices(""), TicketPrices::default());
        assert_eq!(parse_ticket_prices("free show, all ages"), TicketPrices::default());
    }

    #[test]
    fn test_unranged_pair_is_ticket_then_door() {
        let prices = parse_ticket_prices("$15 adv / $20 dos");
        assert_eq!(prices.ticket, Some(15.0));
        assert_eq!(prices.door, Some(20.0));
        assert_eq!(prices.advance, None);
    }

    #[test]
    fn test_cents_are_kept() {
        assert_eq!(parse_ticket_prices("$12.50").ticket, Some(12.5));
    }
}
