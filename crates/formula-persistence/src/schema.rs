// Simplified Diesel schema shared by the SQLite and Postgres backends.
// Tablas: substances, variation_groups, formulas, substance_formula,
// column_preferences
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    substances (id) {
        id -> Text,
        name -> Text,
        odor -> Nullable<Text>,
        fema_number -> Nullable<Integer>,
        cas_number -> Nullable<Text>,
    }
}
diesel::table! {
    variation_groups (id) {
        id -> Text,
        owner_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    formulas (id) {
        id -> Text,
        owner_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        variation_group_id -> Nullable<Text>,
        variation_label -> Nullable<Text>,
        is_main_variation -> Bool,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    substance_formula (id) {
        id -> Text,
        formula_id -> Text,
        substance_id -> Text,
        concentration -> Double,
        unit -> Text,
        sort_order -> Integer,
    }
}
diesel::table! {
    column_preferences (id) {
        id -> Text,
        user_id -> Text,
        group_id -> Text,
        visible_ids -> Text,
        updated_at_ts -> BigInt,
    }
}
allow_tables_to_appear_in_same_query!(substances, variation_groups, formulas, substance_formula, column_preferences);
