diesel::table! {
    items (pk, sk) {
        pk -> Varchar,
        sk -> Varchar,
        attrs -> Jsonb,
        expires_at -> Nullable<Timestamptz>,
    }
}
