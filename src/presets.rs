use crate::types::Inventory;

pub const NAMES: [&str; 3] = ["test1", "inv_5_5", "cover_demo"];

/// Looks up a preset by name.
pub fn preset(name: &str) -> Option<Inventory> {
    let pairs: &[(i64, i64)] = match name {
        // Four 2x2 tiles fill a 4x4 square exactly.
        "test1" => &[(1, 0), (2, 4)],
        // Area 34: one 3x3, three 2x2 and four unit tiles fill 5x5, one 3x3 is left over.
        "inv_5_5" => &[(1, 4), (2, 3), (3, 2)],
        "cover_demo" => &[(1, 6), (2, 5), (3, 4), (4, 3)],
        _ => return None,
    };
    Some(pairs.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryIndex;

    #[test]
    fn test_every_name_resolves() {
        for name in NAMES {
            let inv = preset(name).unwrap_or_else(|| panic!("missing preset {name}"));
            assert!(InventoryIndex::build(&inv).is_ok(), "preset {name} is invalid");
        }
        assert!(preset("nope").is_none());
    }

    #[test]
    fn test_preset_dimensions() {
        let dim = |name| InventoryIndex::build(&preset(name).unwrap()).unwrap().dimension();
        assert_eq!(dim("test1"), 4);
        assert_eq!(dim("inv_5_5"), 5);
        assert_eq!(dim("cover_demo"), 10);
    }
}
