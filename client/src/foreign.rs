//! Foreign reference arrays of an application call.

/// Index of `value` in a call's foreign array, appending it if absent.
///
/// When `zero_value` is given, index 0 is reserved for it (the sender for
/// accounts, the called app for applications) and the array's entries start
/// at 1.
pub fn populate_foreign_array<T: PartialEq>(
    value: T,
    foreign: &mut Vec<T>,
    zero_value: Option<&T>,
) -> usize {
    if zero_value == Some(&value) {
        return 0;
    }
    let offset = usize::from(zero_value.is_some());
    match foreign.iter().position(|entry| *entry == value) {
        Some(position) => position + offset,
        None => {
            foreign.push(value);
            foreign.len() - 1 + offset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avmkit_types::Address;

    #[test]
    fn test_assets_have_no_reserved_slot() {
        let mut assets = vec![];
        assert_eq!(populate_foreign_array(10u64, &mut assets, None), 0);
        assert_eq!(populate_foreign_array(20u64, &mut assets, None), 1);
        assert_eq!(populate_foreign_array(10u64, &mut assets, None), 0);
        assert_eq!(assets, vec![10, 20]);
    }

    #[test]
    fn test_called_app_maps_to_zero() {
        let mut apps = vec![5u64];
        assert_eq!(populate_foreign_array(99u64, &mut apps, Some(&99)), 0);
        assert_eq!(populate_foreign_array(5u64, &mut apps, Some(&99)), 1);
        assert_eq!(populate_foreign_array(6u64, &mut apps, Some(&99)), 2);
        assert_eq!(apps, vec![5, 6]);
    }

    #[test]
    fn test_repeated_account_is_not_appended_twice() {
        let sender = Address::new([1; 32]);
        let other = Address::new([2; 32]);
        let mut accounts = vec![];
        assert_eq!(populate_foreign_array(sender, &mut accounts, Some(&sender)), 0);
        assert!(accounts.is_empty());
        assert_eq!(populate_foreign_array(other, &mut accounts, Some(&sender)), 1);
        assert_eq!(populate_foreign_array(other, &mut accounts, Some(&sender)), 1);
        assert_eq!(accounts, vec![other]);
    }
}
