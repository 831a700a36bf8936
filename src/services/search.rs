use crate::models::{SearchField, Transaction, TransactionHeader};

/// Case-insensitive substring match over the kind's search fields.
/// An empty query matches everything.
pub fn matches<H: TransactionHeader>(tx: &Transaction<H>, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    H::CONFIG.search_fields.iter().any(|field| {
        let haystack = match field {
            SearchField::Number => Some(tx.number.as_str()),
            SearchField::Header(header_field) => tx.header.field_text(*header_field),
        };
        haystack
            .map(|text| text.to_lowercase().contains(&needle))
            .unwrap_or(false)
    })
}

pub fn filter_transactions<'a, H: TransactionHeader>(
    transactions: &'a [Transaction<H>],
    query: &str,
) -> Vec<&'a Transaction<H>> {
    transactions.iter().filter(|tx| matches(*tx, query)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncomingGoods, OutgoingGoods};
    use serde_json::json;

    fn incoming(number: &str, reference: &str) -> IncomingGoods {
        serde_json::from_value(json!({
            "id": number,
            "transactionNumber": number,
            "supplierId": "S1",
            "referenceNumber": reference,
            "receivedAt": "2024-01-01",
            "status": "DRAFT",
            "items": []
        }))
        .unwrap()
    }

    fn outgoing(number: &str, destination: &str) -> OutgoingGoods {
        serde_json::from_value(json!({
            "id": number,
            "transactionNumber": number,
            "destination": destination,
            "recipientName": "Dana",
            "status": "DRAFT",
            "items": []
        }))
        .unwrap()
    }

    #[test]
    fn incoming_search_covers_number_and_reference() {
        let list = vec![incoming("IN-001", "INV-778"), incoming("IN-002", "DN-5")];
        let hits: Vec<&str> = filter_transactions(&list, "inv")
            .iter()
            .map(|t| t.number.as_str())
            .collect();
        assert_eq!(hits, vec!["IN-001"]);
        assert_eq!(filter_transactions(&list, "in-00").len(), 2);
        assert_eq!(filter_transactions(&list, "").len(), 2);
    }

    #[test]
    fn outgoing_search_ignores_destination() {
        let list = vec![outgoing("OUT-9", "Warehouse B")];
        assert!(filter_transactions(&list, "warehouse").is_empty());
        assert_eq!(filter_transactions(&list, "out-9").len(), 1);
    }
}
