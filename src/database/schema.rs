// @generated-by-hand to match migrations/ — mirrors the Diesel CLI output
// convention used elsewhere in this codebase (see database/schema.rs in
// the sibling desktop app).

diesel::table! {
    system_config (key) {
        key -> Text,
        value -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    secrets (key) {
        key -> Text,
        ciphertext -> Binary,
        updated_at -> Text,
    }
}

diesel::table! {
    providers (name) {
        name -> Text,
        enabled -> Integer,
        encrypted_api_key_ref -> Nullable<Text>,
        base_url -> Nullable<Text>,
        monthly_budget -> Double,
        emergency_reserve -> Double,
        total_vram_bytes -> Nullable<BigInt>,
        created_at -> Text,
    }
}

diesel::table! {
    provider_models (provider_name, model_key) {
        provider_name -> Text,
        model_key -> Text,
        model_name -> Nullable<Text>,
        input_cost_per_1m -> Double,
        output_cost_per_1m -> Double,
        capabilities -> Text,
        quality -> Integer,
        vram_estimate_bytes -> Nullable<BigInt>,
        supports_tools -> Nullable<Integer>,
        prefer_loaded -> Integer,
        enabled -> Integer,
    }
}

diesel::table! {
    routing_preferences (intent) {
        intent -> Text,
        refs_json -> Text,
    }
}

diesel::table! {
    budget_usage (id) {
        id -> Text,
        provider -> Text,
        model -> Text,
        intent -> Text,
        tokens_in -> BigInt,
        tokens_out -> BigInt,
        cost -> Double,
        created_at -> Text,
    }
}

diesel::table! {
    llm_calls (id) {
        id -> Text,
        chain_id -> Nullable<Text>,
        intent -> Text,
        provider -> Nullable<Text>,
        model -> Nullable<Text>,
        system_prompt -> Nullable<Text>,
        messages_json -> Text,
        tools_json -> Nullable<Text>,
        response_content -> Nullable<Text>,
        tool_calls_json -> Nullable<Text>,
        tokens_in -> BigInt,
        tokens_out -> BigInt,
        cost -> Double,
        duration_ms -> BigInt,
        error -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    health_checks (id) {
        id -> Text,
        status -> Text,
        response_time_ms -> BigInt,
        details_json -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    chat_messages (id) {
        id -> Text,
        source -> Text,
        galla -> Nullable<Integer>,
        role -> Text,
        content -> Text,
        read -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    inbox_messages (id) {
        id -> Text,
        direction -> Text,
        content -> Text,
        read -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    library_items (id) {
        id -> Text,
        title -> Text,
        body -> Text,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    library_comments (id) {
        id -> Text,
        item_id -> Text,
        author -> Text,
        body -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    galla_log (galla) {
        galla -> Integer,
        plan -> Nullable<Text>,
        summary -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    growth_log (id) {
        id -> Text,
        kind -> Text,
        details_json -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    memories (id) {
        id -> Text,
        content -> Text,
        embedding -> Nullable<Binary>,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    system_config,
    secrets,
    providers,
    provider_models,
    routing_preferences,
    budget_usage,
    llm_calls,
    health_checks,
    chat_messages,
    inbox_messages,
    library_items,
    library_comments,
    galla_log,
    growth_log,
    memories,
);
