// Database schema definitions
diesel::table! {
    patient_profiles (id) {
        id -> Int4,
        name -> Nullable<Text>,
        dob -> Nullable<Text>,
        age -> Nullable<Int4>,
        gender -> Nullable<Text>,
        contact -> Nullable<Text>,
        address -> Nullable<Text>,
        emergency_name -> Nullable<Text>,
        emergency_relation -> Nullable<Text>,
        emergency_contact -> Nullable<Text>,
        emergency_address -> Nullable<Text>,
        medical_history -> Nullable<Text>,
        allergies -> Nullable<Text>,
        medications -> Nullable<Text>,
        prescriptions -> Nullable<Text>,
        test_results -> Nullable<Text>,
        diagnoses -> Nullable<Text>,
        treatment_records -> Nullable<Text>,
        photo -> Nullable<Text>,
        notes -> Nullable<Text>,
        username -> Nullable<Text>,
        patient_id_number -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    patients (id) {
        id -> Int4,
        profile_id -> Nullable<Int4>,
        photo -> Nullable<Text>,
        name -> Nullable<Text>,
        age -> Nullable<Int4>,
        gender -> Nullable<Text>,
        contact -> Nullable<Text>,
        address -> Nullable<Text>,
        chief_complaint -> Nullable<Text>,
        pain_level -> Nullable<Text>,
        pain_description -> Nullable<Text>,
        additional_symptoms -> Nullable<Text>,
        medical_history -> Nullable<Text>,
        emergency_name -> Nullable<Text>,
        emergency_relation -> Nullable<Text>,
        emergency_gender -> Nullable<Text>,
        emergency_contact -> Nullable<Text>,
        emergency_address -> Nullable<Text>,
        heart_rate -> Nullable<Float8>,
        spo2 -> Nullable<Float8>,
        body_temp_f -> Nullable<Float8>,
        env_temp_f -> Nullable<Float8>,
        humidity_percent -> Nullable<Float8>,
        weight_kg -> Nullable<Float8>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    stored_patients (id) {
        id -> Int4,
        profile_id -> Nullable<Int4>,
        photo -> Nullable<Text>,
        name -> Nullable<Text>,
        age -> Nullable<Int4>,
        gender -> Nullable<Text>,
        contact -> Nullable<Text>,
        address -> Nullable<Text>,
        chief_complaint -> Nullable<Text>,
        pain_level -> Nullable<Text>,
        pain_description -> Nullable<Text>,
        additional_symptoms -> Nullable<Text>,
        medical_history -> Nullable<Text>,
        emergency_name -> Nullable<Text>,
        emergency_relation -> Nullable<Text>,
        emergency_gender -> Nullable<Text>,
        emergency_contact -> Nullable<Text>,
        emergency_address -> Nullable<Text>,
        heart_rate -> Nullable<Float8>,
        spo2 -> Nullable<Float8>,
        body_temp_f -> Nullable<Float8>,
        env_temp_f -> Nullable<Float8>,
        humidity_percent -> Nullable<Float8>,
        weight_kg -> Nullable<Float8>,
        created_at -> Timestamp,
        archived_at -> Timestamp,
    }
}

diesel::table! {
    settings (key) {
        key -> Text,
        value -> Text,
    }
}

diesel::table! {
    doctors (id) {
        id -> Int4,
        doctor_id -> Text,
        password_hash -> Text,
        name -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    hospitals (id) {
        id -> Int4,
        hospital_id -> Text,
        password_hash -> Text,
        name -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::joinable!(patients -> patient_profiles (profile_id));
diesel::joinable!(stored_patients -> patient_profiles (profile_id));

diesel::allow_tables_to_appear_in_same_query!(
    patient_profiles, patients, stored_patients,
    settings, doctors, hospitals,
);
