// Mirrors the SQL in `catalog/migrations`.

diesel::table! {
    pools (address) {
        address -> Text,
        token0 -> Text,
        token1 -> Text,
    }
}

diesel::table! {
    scan_cursor (id) {
        id -> Integer,
        next_index -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(pools, scan_cursor);
