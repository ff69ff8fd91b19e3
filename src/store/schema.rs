//! Diesel table definitions for the relational backings (§6 — column names
//! are contractual). Shared between the Postgres and MySQL variants; each
//! backing module picks the conflict-resolution clause appropriate to its
//! dialect.

diesel::table! {
    reference_catalog (reference_id) {
        reference_id -> Integer,
        #[max_length = 255]
        name -> Varchar,
        fingerprinted -> Bool,
        content_digest -> Binary,
    }
}

diesel::table! {
    postings (id) {
        id -> BigInt,
        hash -> BigInt,
        reference_id -> Integer,
        time_offset -> Integer,
    }
}

diesel::table! {
    reference_metadata (name) {
        #[max_length = 255]
        name -> Varchar,
        metadata -> Text,
        source_file -> Nullable<Text>,
        date_added -> Nullable<Timestamp>,
        debounce_seconds -> Nullable<Double>,
    }
}

diesel::joinable!(postings -> reference_catalog (reference_id));
diesel::allow_tables_to_appear_in_same_query!(reference_catalog, postings, reference_metadata);
